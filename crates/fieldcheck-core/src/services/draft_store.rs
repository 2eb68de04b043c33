//! Durable draft store shared by the autosaver, reconciler and sync queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    Database, DraftRepository, ScopeCacheRepository, SqliteDraftRepository,
    SqliteScopeCacheRepository, UploadCompletion,
};
use crate::models::{CompositeKey, DraftRecord, ScopeDefinition, ScopeKey};
use crate::Result;

/// Thread-safe handle to the local draft database.
///
/// Every call completes its write before returning, so a caller that awaited
/// `put` can rely on the record surviving a process restart.
#[derive(Clone)]
pub struct DraftStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DraftStore {
    /// Open the store at the given filesystem path.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path) {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Draft database at {} is unreadable ({}); moving it aside and starting empty",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_file(&db_path)?;
                Database::open(&db_path)?
            }
            Err(error) => return Err(error),
        };

        tracing::debug!("Opened draft store at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Arc::new(Mutex::new(Database::open_in_memory()?)),
            db_path: None,
        })
    }

    /// Location of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn is_corrupted_db_error(error: &crate::Error) -> bool {
        let message = error.to_string().to_ascii_lowercase();
        message.contains("file is not a database") || message.contains("malformed")
    }

    fn quarantine_corrupted_db_file(db_path: &Path) -> Result<()> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let Some(file_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };

        for suffix in ["", "-wal", "-shm"] {
            let source = db_path.with_file_name(format!("{file_name}{suffix}"));
            if source.exists() {
                let backup = db_path.with_file_name(format!("{file_name}{suffix}.corrupt-{timestamp}"));
                std::fs::rename(&source, &backup)?;
                tracing::warn!(
                    "Moved unreadable draft store file {} to {}",
                    source.display(),
                    backup.display()
                );
            }
        }
        Ok(())
    }

    /// Insert or overwrite a record; the key becomes pending as a side effect.
    ///
    /// `record.revision` is updated to the stored version.
    pub async fn put(&self, record: &mut DraftRecord) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteDraftRepository::new(db.connection());
        record.revision = repo.put(record)?;
        tracing::debug!(
            key = %record.composite_key(),
            answers = record.payload.answer_count(),
            retry_count = record.retry_count,
            revision = record.revision,
            "Persisted draft"
        );
        Ok(())
    }

    /// Fetch a record by key.
    pub async fn get(&self, key: &CompositeKey) -> Result<Option<DraftRecord>> {
        let db = self.db.lock().await;
        SqliteDraftRepository::new(db.connection()).get(key)
    }

    /// Delete a record (and with it the pending entry).
    pub async fn delete(&self, key: &CompositeKey) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteDraftRepository::new(db.connection()).delete(key)
    }

    /// Pending keys in queue order.
    pub async fn list_pending(&self) -> Result<Vec<CompositeKey>> {
        let db = self.db.lock().await;
        SqliteDraftRepository::new(db.connection()).list_pending()
    }

    /// Ensure `key` is in the pending set.
    ///
    /// The pending set is derived from stored records, so this is a no-op for
    /// any stored key. A key without a record cannot be pending; that case is
    /// logged and reported as `false`.
    pub async fn enqueue(&self, key: &CompositeKey) -> Result<bool> {
        let db = self.db.lock().await;
        let present = SqliteDraftRepository::new(db.connection()).contains(key)?;
        if !present {
            tracing::warn!(%key, "Ignoring enqueue for a key with no stored draft");
        }
        Ok(present)
    }

    /// Remove `key` from the pending set; safe when absent.
    pub async fn dequeue(&self, key: &CompositeKey) -> Result<()> {
        self.delete(key).await?;
        Ok(())
    }

    /// Number of drafts awaiting upload.
    pub async fn pending_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteDraftRepository::new(db.connection()).pending_count()
    }

    /// All pending records in queue order.
    pub async fn pending_records(&self) -> Result<Vec<DraftRecord>> {
        let db = self.db.lock().await;
        let repo = SqliteDraftRepository::new(db.connection());
        let mut records = Vec::new();
        for key in repo.list_pending()? {
            if let Some(record) = repo.get(&key)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Most recent record for a scope regardless of server id.
    pub async fn latest_for_scope(&self, scope_key: &ScopeKey) -> Result<Option<DraftRecord>> {
        let db = self.db.lock().await;
        SqliteDraftRepository::new(db.connection()).latest_for_scope(scope_key)
    }

    /// Count a failed upload attempt of the given record version.
    pub async fn record_failure(
        &self,
        record: &DraftRecord,
        attempted_at_ms: i64,
    ) -> Result<Option<u32>> {
        let db = self.db.lock().await;
        SqliteDraftRepository::new(db.connection()).record_failure(
            &record.composite_key(),
            record.revision,
            attempted_at_ms,
        )
    }

    /// Give a capped draft a fresh retry budget.
    pub async fn reset_retries(&self, key: &CompositeKey) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteDraftRepository::new(db.connection()).reset_retries(key)
    }

    /// Drop the uploaded version unless a newer save replaced it meanwhile.
    ///
    /// When the upload created the server record, the scope is linked to the
    /// returned id and a newer `_new` save is moved under it, so later uploads
    /// update that record instead of creating another.
    pub async fn complete_upload(
        &self,
        record: &DraftRecord,
        server_record_id: &str,
    ) -> Result<UploadCompletion> {
        let db = self.db.lock().await;
        let tx = db.connection().unchecked_transaction()?;
        let repo = SqliteDraftRepository::new(&tx);

        let completion = repo.complete_upload(&record.composite_key(), record.revision)?;
        if record.server_record_id.is_none() {
            if let Some(moved) = repo.link_server_record(&record.scope_key, server_record_id)? {
                tracing::info!(key = %moved, "Newer draft moved under server record {}", server_record_id);
            }
        }
        tx.commit()?;
        Ok(completion)
    }

    /// Delete exactly this version of a record; a newer save is kept.
    pub async fn discard_version(&self, record: &DraftRecord) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteDraftRepository::new(db.connection())
            .delete_revision(&record.composite_key(), record.revision)
    }

    /// Server record id an earlier upload created for this scope.
    pub async fn linked_record_id(&self, scope_key: &ScopeKey) -> Result<Option<String>> {
        let db = self.db.lock().await;
        SqliteDraftRepository::new(db.connection()).linked_record_id(scope_key)
    }

    /// Remember the latest scope definition for offline loads.
    pub async fn cache_scope(
        &self,
        scope_key: &ScopeKey,
        definition: &ScopeDefinition,
    ) -> Result<()> {
        let db = self.db.lock().await;
        SqliteScopeCacheRepository::new(db.connection()).save(scope_key, definition)
    }

    /// Previously cached scope definition.
    pub async fn cached_scope(&self, scope_key: &ScopeKey) -> Result<Option<ScopeDefinition>> {
        let db = self.db.lock().await;
        SqliteScopeCacheRepository::new(db.connection()).load(scope_key)
    }
}
