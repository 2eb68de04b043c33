//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }
    if version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: draft records
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS drafts (
            composite_key TEXT PRIMARY KEY,
            scope_key TEXT NOT NULL,
            server_record_id TEXT,
            payload TEXT NOT NULL,
            captured_at INTEGER NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_attempt_at INTEGER,
            queued_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_drafts_queue ON drafts(queued_at, composite_key);
        CREATE INDEX IF NOT EXISTS idx_drafts_scope ON drafts(scope_key, captured_at DESC);
        INSERT OR IGNORE INTO schema_version (version) VALUES (1);
        COMMIT;",
    )?;

    tracing::info!("Applied draft store migration v1");
    Ok(())
}

/// Migration to version 2: cached scope definitions for offline loads
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS scope_cache (
            scope_key TEXT PRIMARY KEY,
            definition TEXT NOT NULL,
            cached_at INTEGER NOT NULL
        );
        INSERT OR IGNORE INTO schema_version (version) VALUES (2);
        COMMIT;",
    )?;

    tracing::info!("Applied draft store migration v2");
    Ok(())
}

/// Migration to version 3: draft revisions and scope to server record links
fn migrate_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "BEGIN;
        ALTER TABLE drafts ADD COLUMN revision INTEGER NOT NULL DEFAULT 0;
        CREATE TABLE IF NOT EXISTS revision_counter (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            value INTEGER NOT NULL
        );
        INSERT OR IGNORE INTO revision_counter (id, value) VALUES (1, 0);
        CREATE TABLE IF NOT EXISTS server_links (
            scope_key TEXT PRIMARY KEY,
            server_record_id TEXT NOT NULL,
            linked_at INTEGER NOT NULL
        );
        INSERT OR IGNORE INTO schema_version (version) VALUES ({CURRENT_VERSION});
        COMMIT;"
    ))?;

    tracing::info!("Applied draft store migration v3");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn v3_upgrades_existing_drafts() {
        let conn = Connection::open_in_memory().unwrap();
        migrate_v1(&conn).unwrap();
        migrate_v2(&conn).unwrap();
        conn.execute(
            "INSERT INTO drafts (composite_key, scope_key, payload, captured_at, queued_at)
             VALUES ('a_new', 'a', '{}', 1, 1)",
            [],
        )
        .unwrap();

        run(&conn).unwrap();

        let revision: i64 = conn
            .query_row("SELECT revision FROM drafts WHERE composite_key = 'a_new'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(revision, 0);
        assert_eq!(get_version(&conn).unwrap(), 3);
    }
}
