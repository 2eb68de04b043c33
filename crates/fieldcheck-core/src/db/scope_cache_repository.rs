//! Scope definition cache used when the backend is unreachable

use crate::error::Result;
use crate::models::{ScopeDefinition, ScopeKey};
use crate::util::unix_millis_now;
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for cached scope definitions
pub trait ScopeCacheRepository {
    /// Store the latest definition fetched for a scope
    fn save(&self, scope_key: &ScopeKey, definition: &ScopeDefinition) -> Result<()>;

    /// Load the cached definition for a scope
    fn load(&self, scope_key: &ScopeKey) -> Result<Option<ScopeDefinition>>;
}

/// `SQLite` implementation of `ScopeCacheRepository`
pub struct SqliteScopeCacheRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteScopeCacheRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl ScopeCacheRepository for SqliteScopeCacheRepository<'_> {
    fn save(&self, scope_key: &ScopeKey, definition: &ScopeDefinition) -> Result<()> {
        let raw = serde_json::to_string(definition)?;
        self.conn.execute(
            "INSERT INTO scope_cache (scope_key, definition, cached_at) VALUES (?, ?, ?)
             ON CONFLICT(scope_key) DO UPDATE SET definition = excluded.definition, cached_at = excluded.cached_at",
            params![scope_key.as_str(), raw, unix_millis_now()],
        )?;
        Ok(())
    }

    fn load(&self, scope_key: &ScopeKey) -> Result<Option<ScopeDefinition>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT definition FROM scope_cache WHERE scope_key = ?",
                params![scope_key.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
