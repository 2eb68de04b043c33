//! One-stop handle wiring store, promoter, queue and reconciler together.

use std::sync::Arc;

use tokio::sync::watch;

use crate::api::{ChecklistApi, HttpChecklistApi};
use crate::config::EngineConfig;
use crate::credentials::CredentialStore;
use crate::draft::{AutosaveHandle, DraftSaver, DraftSession, FormState};
use crate::models::{CompositeKey, DraftRecord, PhotoReference, ScopeKey, SyncStatus};
use crate::outcome::Outcome;
use crate::reconcile::{Hydration, Reconciler};
use crate::services::DraftStore;
use crate::storage::PhotoPromoter;
use crate::sync::{ConnectivityWatcher, FlushMode, FlushOutcome, SyncExecutor, SyncQueue};
use crate::{Error, Result};

pub struct SyncEngine<A, C> {
    config: EngineConfig,
    store: DraftStore,
    promoter: PhotoPromoter,
    queue: Arc<SyncQueue<A, C>>,
}

impl<C: CredentialStore> SyncEngine<HttpChecklistApi, C> {
    /// Open against the configured HTTP backend.
    pub fn open(config: EngineConfig, credentials: C) -> Result<Self> {
        let base_url = config.api_base_url.as_deref().ok_or_else(|| {
            Error::Config("FIELDCHECK_API_BASE_URL is not set".to_string())
        })?;
        let api = HttpChecklistApi::new(base_url, config.http_timeout)?;
        Self::open_with(config, api, credentials)
    }
}

impl<A: ChecklistApi, C: CredentialStore> SyncEngine<A, C> {
    pub fn open_with(config: EngineConfig, api: A, credentials: C) -> Result<Self> {
        let store = DraftStore::open_path(config.database_path())?;
        let promoter = PhotoPromoter::new(config.photos_dir());
        let executor = SyncExecutor::new(
            store.clone(),
            api,
            credentials,
            config.retry,
            config.compression,
        );
        let queue = Arc::new(SyncQueue::new(store.clone(), executor, config.retry));

        tracing::info!(data_dir = %config.data_dir.display(), "Sync engine opened");
        Ok(Self {
            config,
            store,
            promoter,
            queue,
        })
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub const fn store(&self) -> &DraftStore {
        &self.store
    }

    pub const fn queue(&self) -> &Arc<SyncQueue<A, C>> {
        &self.queue
    }

    pub fn saver(&self) -> DraftSaver {
        DraftSaver::new(self.store.clone(), self.promoter.clone())
    }

    /// Debounced autosave for an editing session.
    pub fn autosave(&self, session: DraftSession) -> AutosaveHandle {
        self.saver().spawn_autosave(session, self.config.autosave_debounce)
    }

    pub fn watcher(&self) -> ConnectivityWatcher<A, C> {
        ConnectivityWatcher::new(Arc::clone(&self.queue))
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.queue.subscribe()
    }

    /// Status with a freshly counted pending set.
    pub async fn status(&self) -> Result<SyncStatus> {
        self.queue.publish().await
    }

    /// Open a scope's form, reconciling local and server drafts.
    pub async fn load_draft(
        &self,
        scope_key: &ScopeKey,
        server_record_id: Option<&str>,
    ) -> Result<Outcome<Hydration>> {
        let executor = self.queue.executor();
        Reconciler::new(
            &self.store,
            &self.promoter,
            executor.api(),
            executor.credentials(),
        )
        .reconcile(scope_key, server_record_id)
        .await
    }

    /// Save immediately, bypassing the debounce.
    pub async fn save_draft(
        &self,
        session: &DraftSession,
        form: &FormState,
    ) -> Result<Outcome<DraftRecord>> {
        let saved = self.saver().save(session, form).await?;
        self.queue.publish().await?;
        Ok(saved)
    }

    /// User-requested flush of every pending draft.
    pub async fn sync_now(&self) -> Result<FlushOutcome> {
        self.queue.flush(FlushMode::Manual).await
    }

    /// Restore the retry budget of one draft and sync it.
    pub async fn retry(&self, key: &CompositeKey) -> Result<FlushOutcome> {
        if !self.store.reset_retries(key).await? {
            return Err(Error::NotFound(format!("draft {key}")));
        }
        self.queue.sync_key(key).await
    }

    /// Drop a pending draft; its durable photos are left in place.
    pub async fn discard(&self, key: &CompositeKey) -> Result<bool> {
        let removed = self.store.delete(key).await?;
        self.queue.publish().await?;
        Ok(removed)
    }

    /// Submit a session's stored draft as final.
    pub async fn finalize(
        &self,
        session: &DraftSession,
        signature: &PhotoReference,
        selfie: &PhotoReference,
    ) -> Result<String> {
        let server_record_id = self.saver().record_id_for(session).await?;
        let key = CompositeKey::new(&session.scope_key, server_record_id.as_deref());
        let record = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("draft {key}")))?;
        let server_record_id = self
            .queue
            .executor()
            .finalize(&record, signature, selfie)
            .await?;
        self.queue.publish().await?;
        Ok(server_record_id)
    }

    pub async fn pending_records(&self) -> Result<Vec<DraftRecord>> {
        self.store.pending_records().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use crate::models::{Answer, AnswerValue, ScopeDefinition, ScopeSnapshot, ServerDraft};
    use crate::reconcile::HydrationSource;
    use crate::sync::{FlushReport, NetworkEvent};
    use crate::testing::FakeApi;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn engine(
        data_dir: &std::path::Path,
        api: &FakeApi,
    ) -> SyncEngine<FakeApi, MemoryCredentialStore> {
        SyncEngine::open_with(
            EngineConfig::new(data_dir),
            api.clone(),
            MemoryCredentialStore::with_token("tok"),
        )
        .unwrap()
    }

    #[test]
    fn open_requires_base_url() {
        let tmp = tempdir().unwrap();
        let result = SyncEngine::open(EngineConfig::new(tmp.path()), MemoryCredentialStore::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn offline_draft_survives_restart_and_uploads_once_online() {
        let tmp = tempdir().unwrap();
        let data_dir = tmp.path().join("data");
        let capture = tmp.path().join("camera-cache").join("IMG_0042.jpg");
        std::fs::create_dir_all(capture.parent().unwrap()).unwrap();
        std::fs::write(&capture, crate::storage::source_png(32, 32)).unwrap();

        let api = FakeApi::default();
        api.set_offline(true);
        let scope = ScopeKey::new("site 4/unit 2").unwrap();
        let session = DraftSession::new(scope.clone(), None);

        {
            let first = engine(&data_dir, &api);
            first.queue().set_online(false).await.unwrap();

            let mut form = FormState::default();
            for index in 0..3 {
                form.answer(format!("q{index}"), AnswerValue::Boolean(true));
            }
            form.attach_photo(
                "facade",
                PhotoReference::new(capture.to_string_lossy(), "image/jpeg", "IMG_0042.jpg"),
            );
            assert!(first.save_draft(&session, &form).await.unwrap().is_ok());
        }
        std::fs::remove_file(&capture).unwrap();

        let second = engine(&data_dir, &api);
        let status = second.status().await.unwrap();
        assert_eq!(status.pending_syncs, 1);

        let stored = second.pending_records().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].payload.answer_count(), 3);
        let photo = &stored[0].payload.photos["facade"][0];
        assert!(photo.uri.ends_with("site_4_unit_2/facade_0.jpg"));
        assert!(std::path::Path::new(&photo.uri).exists());

        api.set_offline(false);
        let watcher = second.watcher();
        let flushed = watcher.handle(NetworkEvent::Online).await.unwrap();
        assert_eq!(
            flushed,
            Some(FlushOutcome::Completed(FlushReport {
                success: 1,
                failed: 0,
                skipped: 0
            }))
        );
        assert_eq!(api.uploads().len(), 1);
        assert_eq!(api.uploads()[0].photo_count(), 1);
        assert_eq!(second.status().await.unwrap().pending_syncs, 0);
    }

    #[tokio::test]
    async fn retry_resets_budget_and_discard_removes() {
        let tmp = tempdir().unwrap();
        let api = FakeApi::default();
        let engine = engine(tmp.path(), &api);
        let session = DraftSession::new(ScopeKey::new("a").unwrap(), Some("9".to_string()));
        let mut form = FormState::default();
        form.answer("q1", AnswerValue::Boolean(false));
        engine.save_draft(&session, &form).await.unwrap();

        let key = CompositeKey::new(&session.scope_key, Some("9"));
        api.set_failing(true);
        for _ in 0..5 {
            engine.sync_now().await.unwrap();
        }
        assert_eq!(engine.store().get(&key).await.unwrap().unwrap().retry_count, 5);

        api.set_failing(false);
        let outcome = engine.retry(&key).await.unwrap();
        assert!(matches!(outcome, FlushOutcome::Completed(FlushReport { success: 1, .. })));
        assert!(matches!(engine.retry(&key).await, Err(Error::NotFound(_))));

        engine.save_draft(&session, &form).await.unwrap();
        assert!(engine.discard(&key).await.unwrap());
        assert_eq!(engine.status().await.unwrap().pending_syncs, 0);
    }

    #[tokio::test]
    async fn load_draft_hydrates_saved_form_offline() {
        let tmp = tempdir().unwrap();
        let api = FakeApi::default();
        api.set_offline(true);
        let engine = engine(tmp.path(), &api);
        let scope = ScopeKey::new("tower-b").unwrap();
        engine
            .store()
            .cache_scope(&scope, &ScopeDefinition::default())
            .await
            .unwrap();

        let mut form = FormState::default();
        form.answer("q1", AnswerValue::Text("ok".to_string()));
        engine
            .save_draft(&DraftSession::new(scope.clone(), None), &form)
            .await
            .unwrap();

        let hydration = engine.load_draft(&scope, None).await.unwrap().into_value().unwrap();
        assert_eq!(hydration.source, HydrationSource::Local);
        assert_eq!(hydration.form.answers, form.answers);
    }

    #[tokio::test]
    async fn repeated_saves_of_one_session_update_a_single_server_record() {
        let tmp = tempdir().unwrap();
        let api = FakeApi::default();
        let engine = engine(tmp.path(), &api);
        let session = DraftSession::new(ScopeKey::new("tower-b").unwrap(), None);

        let mut form = FormState::default();
        form.answer("q1", AnswerValue::Boolean(true));
        engine.save_draft(&session, &form).await.unwrap();
        engine.sync_now().await.unwrap();

        form.answer("q2", AnswerValue::Boolean(false));
        engine.save_draft(&session, &form).await.unwrap();
        engine.sync_now().await.unwrap();

        let ids: Vec<_> = api
            .uploads()
            .iter()
            .map(|upload| upload.fields.server_record_id.clone())
            .collect();
        assert_eq!(ids, vec![None, Some("srv-1".to_string())]);
        assert_eq!(engine.status().await.unwrap().pending_syncs, 0);
    }

    #[tokio::test]
    async fn server_draft_with_more_answers_is_not_overwritten() {
        let tmp = tempdir().unwrap();
        let api = FakeApi::default();
        let engine = engine(tmp.path(), &api);
        let scope = ScopeKey::new("tower-b").unwrap();
        let session = DraftSession::new(scope.clone(), Some("77".to_string()));

        let mut form = FormState::default();
        for index in 0..3 {
            form.answer(format!("q{index}"), AnswerValue::Boolean(true));
        }
        engine.save_draft(&session, &form).await.unwrap();

        api.insert_snapshot(
            "tower-b",
            ScopeSnapshot {
                definition: ScopeDefinition::default(),
                server_draft: Some(ServerDraft {
                    id: "77".to_string(),
                    answers: (0..5)
                        .map(|index| Answer {
                            question_id: format!("q{index}"),
                            value: AnswerValue::Text("server".to_string()),
                        })
                        .collect(),
                    observations: None,
                    location: None,
                    photos: std::collections::BTreeMap::new(),
                }),
            },
        );

        let hydration = engine.load_draft(&scope, Some("77")).await.unwrap().into_value().unwrap();
        assert_eq!(hydration.source, HydrationSource::Server);
        assert_eq!(hydration.form.answered_count(), 5);

        let flushed = engine.sync_now().await.unwrap();
        assert_eq!(
            flushed,
            FlushOutcome::Completed(FlushReport {
                success: 0,
                failed: 0,
                skipped: 0
            })
        );
        assert!(api.uploads().is_empty());
    }
}
