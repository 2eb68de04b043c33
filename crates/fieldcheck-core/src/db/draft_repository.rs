//! Draft record repository implementation
//!
//! The pending-sync set is derived from this table: a key is pending
//! exactly when a row exists for it. `queued_at` is set when the key first
//! enters the table and survives overwrites, which gives the queue a stable
//! order.
//!
//! Every `put` takes the next value of a store-wide revision counter. The
//! upload and reconciliation paths compare on that revision, never on the
//! capture time, so a save landing in the same millisecond is still a new
//! version.

use crate::draft::{decode_payload, encode_payload};
use crate::error::Result;
use crate::models::{CompositeKey, DraftPayload, DraftRecord, ScopeKey};
use crate::util::unix_millis_now;
use rusqlite::{params, Connection, OptionalExtension};

const SELECT_COLUMNS: &str =
    "scope_key, server_record_id, payload, captured_at, retry_count, last_attempt_at, revision";

/// What happened to a record once the server acknowledged its upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCompletion {
    /// The uploaded version was still current and has been removed.
    Removed,
    /// A newer local save replaced the record mid-upload; it stays pending.
    Superseded,
    /// The record was already gone (discarded by the user).
    Missing,
}

/// Trait for draft storage operations
pub trait DraftRepository {
    /// Insert or fully overwrite the record under its composite key
    ///
    /// Returns the revision assigned to the stored version.
    fn put(&self, record: &DraftRecord) -> Result<i64>;

    /// Get a record by key
    fn get(&self, key: &CompositeKey) -> Result<Option<DraftRecord>>;

    /// Delete a record; returns whether a row was removed
    fn delete(&self, key: &CompositeKey) -> Result<bool>;

    /// Whether a record (and therefore a pending entry) exists
    fn contains(&self, key: &CompositeKey) -> Result<bool>;

    /// Pending keys in queue order
    fn list_pending(&self) -> Result<Vec<CompositeKey>>;

    /// Number of pending records
    fn pending_count(&self) -> Result<usize>;

    /// Most recently captured record for a scope, whatever its server id
    fn latest_for_scope(&self, scope_key: &ScopeKey) -> Result<Option<DraftRecord>>;

    /// Count a failed upload of the given revision
    ///
    /// Returns the new retry count, or `None` when that version is no longer
    /// stored (deleted, or superseded by a newer local save).
    fn record_failure(
        &self,
        key: &CompositeKey,
        revision: i64,
        attempted_at_ms: i64,
    ) -> Result<Option<u32>>;

    /// Reset the retry budget for a manual retry
    fn reset_retries(&self, key: &CompositeKey) -> Result<bool>;

    /// Remove the record if the uploaded version is still the stored one
    fn complete_upload(&self, key: &CompositeKey, revision: i64) -> Result<UploadCompletion>;

    /// Delete the record only if `revision` is still the stored version
    fn delete_revision(&self, key: &CompositeKey, revision: i64) -> Result<bool>;

    /// Remember the server record created for a scope and move a waiting
    /// `_new` record under the server id
    ///
    /// Returns the key the waiting record now lives under, if one was moved.
    fn link_server_record(
        &self,
        scope_key: &ScopeKey,
        server_record_id: &str,
    ) -> Result<Option<CompositeKey>>;

    /// Server record id previously linked to a scope
    fn linked_record_id(&self, scope_key: &ScopeKey) -> Result<Option<String>>;
}

/// `SQLite` implementation of `DraftRepository`
pub struct SqliteDraftRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteDraftRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a draft from a database row
    fn parse_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DraftRow> {
        Ok(DraftRow {
            scope_key: row.get(0)?,
            server_record_id: row.get(1)?,
            payload: row.get(2)?,
            captured_at: row.get(3)?,
            retry_count: row.get(4)?,
            last_attempt_at: row.get(5)?,
            revision: row.get(6)?,
        })
    }

    fn next_revision(&self) -> Result<i64> {
        let revision = self.conn.query_row(
            "UPDATE revision_counter SET value = value + 1 WHERE id = 1 RETURNING value",
            [],
            |row| row.get(0),
        )?;
        Ok(revision)
    }
}

struct DraftRow {
    scope_key: String,
    server_record_id: Option<String>,
    payload: String,
    captured_at: i64,
    retry_count: u32,
    last_attempt_at: Option<i64>,
    revision: i64,
}

impl DraftRow {
    fn into_record(self) -> Result<DraftRecord> {
        let payload: DraftPayload = decode_payload(&self.payload)?;
        Ok(DraftRecord {
            scope_key: ScopeKey::new(self.scope_key)?,
            server_record_id: self.server_record_id,
            payload,
            captured_at_ms: self.captured_at,
            retry_count: self.retry_count,
            last_attempt_at_ms: self.last_attempt_at,
            revision: self.revision,
        })
    }
}

impl DraftRepository for SqliteDraftRepository<'_> {
    fn put(&self, record: &DraftRecord) -> Result<i64> {
        let key = record.composite_key();
        let payload = encode_payload(&record.payload)?;
        let revision = self.next_revision()?;

        self.conn.execute(
            "INSERT INTO drafts (composite_key, scope_key, server_record_id, payload, captured_at, retry_count, last_attempt_at, queued_at, revision)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(composite_key) DO UPDATE SET
                scope_key = excluded.scope_key,
                server_record_id = excluded.server_record_id,
                payload = excluded.payload,
                captured_at = excluded.captured_at,
                retry_count = excluded.retry_count,
                last_attempt_at = excluded.last_attempt_at,
                revision = excluded.revision",
            params![
                key.as_str(),
                record.scope_key.as_str(),
                record.server_record_id,
                payload,
                record.captured_at_ms,
                record.retry_count,
                record.last_attempt_at_ms,
                unix_millis_now(),
                revision
            ],
        )?;

        Ok(revision)
    }

    fn get(&self, key: &CompositeKey) -> Result<Option<DraftRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM drafts WHERE composite_key = ?"),
                params![key.as_str()],
                Self::parse_row,
            )
            .optional()?;

        row.map(DraftRow::into_record).transpose()
    }

    fn delete(&self, key: &CompositeKey) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM drafts WHERE composite_key = ?",
            params![key.as_str()],
        )?;
        Ok(rows > 0)
    }

    fn contains(&self, key: &CompositeKey) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM drafts WHERE composite_key = ?)",
            params![key.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn list_pending(&self) -> Result<Vec<CompositeKey>> {
        let mut stmt = self
            .conn
            .prepare("SELECT composite_key FROM drafts ORDER BY queued_at ASC, composite_key ASC")?;

        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        keys.iter().map(|key| CompositeKey::parse(key)).collect()
    }

    fn pending_count(&self) -> Result<usize> {
        let count: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM drafts", [], |row| row.get(0))?;
        Ok(count)
    }

    fn latest_for_scope(&self, scope_key: &ScopeKey) -> Result<Option<DraftRecord>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM drafts
                     WHERE scope_key = ?
                     ORDER BY captured_at DESC
                     LIMIT 1"
                ),
                params![scope_key.as_str()],
                Self::parse_row,
            )
            .optional()?;

        row.map(DraftRow::into_record).transpose()
    }

    fn record_failure(
        &self,
        key: &CompositeKey,
        revision: i64,
        attempted_at_ms: i64,
    ) -> Result<Option<u32>> {
        let retry_count = self
            .conn
            .query_row(
                "UPDATE drafts
                 SET retry_count = retry_count + 1, last_attempt_at = ?3
                 WHERE composite_key = ?1 AND revision = ?2
                 RETURNING retry_count",
                params![key.as_str(), revision, attempted_at_ms],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(retry_count)
    }

    fn reset_retries(&self, key: &CompositeKey) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE drafts SET retry_count = 0, last_attempt_at = NULL WHERE composite_key = ?",
            params![key.as_str()],
        )?;
        Ok(rows > 0)
    }

    fn complete_upload(&self, key: &CompositeKey, revision: i64) -> Result<UploadCompletion> {
        if self.delete_revision(key, revision)? {
            return Ok(UploadCompletion::Removed);
        }
        if self.contains(key)? {
            Ok(UploadCompletion::Superseded)
        } else {
            Ok(UploadCompletion::Missing)
        }
    }

    fn delete_revision(&self, key: &CompositeKey, revision: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM drafts WHERE composite_key = ?1 AND revision = ?2",
            params![key.as_str(), revision],
        )?;
        Ok(rows > 0)
    }

    fn link_server_record(
        &self,
        scope_key: &ScopeKey,
        server_record_id: &str,
    ) -> Result<Option<CompositeKey>> {
        self.conn.execute(
            "INSERT INTO server_links (scope_key, server_record_id, linked_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_key) DO UPDATE SET
                server_record_id = excluded.server_record_id,
                linked_at = excluded.linked_at",
            params![scope_key.as_str(), server_record_id, unix_millis_now()],
        )?;

        let unsynced = CompositeKey::unsynced(scope_key);
        let linked = CompositeKey::new(scope_key, Some(server_record_id));
        if unsynced == linked {
            return Ok(None);
        }
        let Some(waiting) = self.get(&unsynced)? else {
            return Ok(None);
        };

        // Last local write wins between the two keys.
        if let Some(existing) = self.get(&linked)? {
            if existing.revision > waiting.revision {
                self.delete(&unsynced)?;
                return Ok(None);
            }
            self.delete(&linked)?;
        }

        self.conn.execute(
            "UPDATE drafts SET composite_key = ?1, server_record_id = ?2 WHERE composite_key = ?3",
            params![linked.as_str(), server_record_id, unsynced.as_str()],
        )?;
        Ok(Some(linked))
    }

    fn linked_record_id(&self, scope_key: &ScopeKey) -> Result<Option<String>> {
        let id = self
            .conn
            .query_row(
                "SELECT server_record_id FROM server_links WHERE scope_key = ?",
                params![scope_key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Answer, AnswerValue};
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn record(scope: &str, server_id: Option<&str>, answers: usize) -> DraftRecord {
        let payload = DraftPayload {
            answers: (0..answers)
                .map(|index| Answer {
                    question_id: format!("q{index}"),
                    value: AnswerValue::Boolean(true),
                })
                .collect(),
            ..DraftPayload::default()
        };
        DraftRecord::new(
            ScopeKey::new(scope).unwrap(),
            server_id.map(ToString::to_string),
            payload,
        )
    }

    #[test]
    fn test_put_and_get() {
        let db = setup();
        let repo = SqliteDraftRepository::new(db.connection());

        let mut draft = record("tower-b", None, 3);
        draft.revision = repo.put(&draft).unwrap();

        let fetched = repo.get(&draft.composite_key()).unwrap().unwrap();
        assert_eq!(fetched, draft);
        assert!(repo.get(&CompositeKey::parse("other_new").unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_put_overwrites_without_duplicating() {
        let db = setup();
        let repo = SqliteDraftRepository::new(db.connection());

        let first = record("tower-b", Some("12"), 1);
        repo.put(&first).unwrap();
        let mut second = record("tower-b", Some("12"), 4);
        second.retry_count = 2;
        repo.put(&second).unwrap();

        assert_eq!(repo.pending_count().unwrap(), 1);
        let stored = repo.get(&second.composite_key()).unwrap().unwrap();
        assert_eq!(stored.payload.answer_count(), 4);
        assert_eq!(stored.retry_count, 2);
    }

    #[test]
    fn test_list_pending_keeps_first_queue_position() {
        let db = setup();
        let repo = SqliteDraftRepository::new(db.connection());

        let a = record("a", None, 1);
        let b = record("b", None, 1);
        repo.put(&a).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        repo.put(&b).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        repo.put(&record("a", None, 2)).unwrap();

        let keys = repo.list_pending().unwrap();
        assert_eq!(keys, vec![a.composite_key(), b.composite_key()]);
    }

    #[test]
    fn test_record_failure_increments_current_version_only() {
        let db = setup();
        let repo = SqliteDraftRepository::new(db.connection());

        let draft = record("tower-b", None, 1);
        let revision = repo.put(&draft).unwrap();
        let key = draft.composite_key();

        assert_eq!(repo.record_failure(&key, revision, 10).unwrap(), Some(1));
        assert_eq!(repo.record_failure(&key, revision, 20).unwrap(), Some(2));
        assert_eq!(repo.record_failure(&key, revision - 1, 30).unwrap(), None);

        let stored = repo.get(&key).unwrap().unwrap();
        assert_eq!(stored.retry_count, 2);
        assert_eq!(stored.last_attempt_at_ms, Some(20));

        assert!(repo.reset_retries(&key).unwrap());
        let stored = repo.get(&key).unwrap().unwrap();
        assert_eq!(stored.retry_count, 0);
        assert_eq!(stored.last_attempt_at_ms, None);
    }

    #[test]
    fn test_complete_upload_respects_newer_saves() {
        let db = setup();
        let repo = SqliteDraftRepository::new(db.connection());

        let draft = record("tower-b", None, 1);
        let revision = repo.put(&draft).unwrap();
        let key = draft.composite_key();

        assert_eq!(
            repo.complete_upload(&key, revision - 1).unwrap(),
            UploadCompletion::Superseded
        );
        assert_eq!(
            repo.complete_upload(&key, revision).unwrap(),
            UploadCompletion::Removed
        );
        assert_eq!(
            repo.complete_upload(&key, revision).unwrap(),
            UploadCompletion::Missing
        );
        assert_eq!(repo.pending_count().unwrap(), 0);
    }

    #[test]
    fn test_save_in_same_millisecond_is_a_new_version() {
        let db = setup();
        let repo = SqliteDraftRepository::new(db.connection());

        let uploaded = record("tower-b", None, 1);
        let uploaded_revision = repo.put(&uploaded).unwrap();
        let mut newer = record("tower-b", None, 2);
        newer.captured_at_ms = uploaded.captured_at_ms;
        let newer_revision = repo.put(&newer).unwrap();
        assert!(newer_revision > uploaded_revision);

        let key = uploaded.composite_key();
        assert_eq!(
            repo.complete_upload(&key, uploaded_revision).unwrap(),
            UploadCompletion::Superseded
        );
        assert_eq!(repo.record_failure(&key, uploaded_revision, 5).unwrap(), None);
        let stored = repo.get(&key).unwrap().unwrap();
        assert_eq!(stored.payload.answer_count(), 2);
        assert_eq!(stored.retry_count, 0);
    }

    #[test]
    fn test_revisions_keep_increasing_after_delete() {
        let db = setup();
        let repo = SqliteDraftRepository::new(db.connection());

        let draft = record("tower-b", None, 1);
        let first = repo.put(&draft).unwrap();
        assert!(repo.delete(&draft.composite_key()).unwrap());
        let second = repo.put(&draft).unwrap();

        assert!(second > first);
        assert!(!repo.delete_revision(&draft.composite_key(), first).unwrap());
        assert!(repo.delete_revision(&draft.composite_key(), second).unwrap());
    }

    #[test]
    fn test_link_moves_waiting_record_under_server_id() {
        let db = setup();
        let repo = SqliteDraftRepository::new(db.connection());
        let scope = ScopeKey::new("tower-b").unwrap();

        let waiting = record("tower-b", None, 4);
        repo.put(&waiting).unwrap();
        repo.put(&record("tower-c", None, 1)).unwrap();

        let moved = repo.link_server_record(&scope, "srv-1").unwrap();
        let linked = CompositeKey::new(&scope, Some("srv-1"));
        assert_eq!(moved, Some(linked.clone()));
        assert!(!repo.contains(&waiting.composite_key()).unwrap());

        let stored = repo.get(&linked).unwrap().unwrap();
        assert_eq!(stored.server_record_id.as_deref(), Some("srv-1"));
        assert_eq!(stored.payload.answer_count(), 4);
        assert_eq!(repo.list_pending().unwrap()[0], linked);
        assert_eq!(repo.linked_record_id(&scope).unwrap().as_deref(), Some("srv-1"));
        assert_eq!(
            repo.linked_record_id(&ScopeKey::new("tower-c").unwrap()).unwrap(),
            None
        );
    }

    #[test]
    fn test_link_keeps_the_newer_of_two_versions() {
        let db = setup();
        let repo = SqliteDraftRepository::new(db.connection());
        let scope = ScopeKey::new("tower-b").unwrap();

        repo.put(&record("tower-b", None, 1)).unwrap();
        repo.put(&record("tower-b", Some("srv-1"), 6)).unwrap();

        assert_eq!(repo.link_server_record(&scope, "srv-1").unwrap(), None);
        assert_eq!(repo.pending_count().unwrap(), 1);
        let stored = repo.get(&CompositeKey::new(&scope, Some("srv-1"))).unwrap().unwrap();
        assert_eq!(stored.payload.answer_count(), 6);
    }

    #[test]
    fn test_latest_for_scope() {
        let db = setup();
        let repo = SqliteDraftRepository::new(db.connection());

        let mut older = record("tower-b", None, 1);
        older.captured_at_ms = 1_000;
        let mut newer = record("tower-b", Some("40"), 2);
        newer.captured_at_ms = 2_000;
        repo.put(&older).unwrap();
        repo.put(&newer).unwrap();
        repo.put(&record("tower-c", None, 5)).unwrap();

        let latest = repo
            .latest_for_scope(&ScopeKey::new("tower-b").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(latest.server_record_id.as_deref(), Some("40"));
    }

    #[test]
    fn test_delete_is_safe_when_absent() {
        let db = setup();
        let repo = SqliteDraftRepository::new(db.connection());

        let draft = record("tower-b", None, 1);
        repo.put(&draft).unwrap();
        assert!(repo.delete(&draft.composite_key()).unwrap());
        assert!(!repo.delete(&draft.composite_key()).unwrap());
        assert!(!repo.contains(&draft.composite_key()).unwrap());
    }
}
