//! Debounced local save path.
//!
//! Rapid edits collapse into one persisted write once the form has been
//! idle for the debounce interval. Every save runs serialize, promote, put
//! and resets the retry budget of the stored draft.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::models::{DraftRecord, ScopeKey};
use crate::outcome::Outcome;
use crate::services::DraftStore;
use crate::storage::PhotoPromoter;
use crate::{Error, Result};

use super::serializer::FormState;

/// Identifies which draft an editing session writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftSession {
    pub scope_key: ScopeKey,
    pub server_record_id: Option<String>,
}

impl DraftSession {
    pub const fn new(scope_key: ScopeKey, server_record_id: Option<String>) -> Self {
        Self {
            scope_key,
            server_record_id,
        }
    }
}

/// Persists form state through the photo promoter into the draft store.
#[derive(Clone)]
pub struct DraftSaver {
    store: DraftStore,
    promoter: PhotoPromoter,
}

impl DraftSaver {
    pub const fn new(store: DraftStore, promoter: PhotoPromoter) -> Self {
        Self { store, promoter }
    }

    /// Server record the session writes to.
    ///
    /// A session opened before its first upload has no id; once an upload
    /// created the server record, the id linked to the scope is used.
    pub async fn record_id_for(&self, session: &DraftSession) -> Result<Option<String>> {
        match &session.server_record_id {
            Some(id) => Ok(Some(id.clone())),
            None => self.store.linked_record_id(&session.scope_key).await,
        }
    }

    /// Save the form now.
    ///
    /// Store failures are returned so the caller keeps its in-memory form;
    /// photos that could not be promoted make the outcome `Degraded`.
    pub async fn save(&self, session: &DraftSession, form: &FormState) -> Result<Outcome<DraftRecord>> {
        let mut payload = form.to_payload();

        let promotion = self.promoter.promote(&session.scope_key, &payload.photos).await;
        let reasons = promotion.reasons().to_vec();
        if let Some(photos) = promotion.into_value() {
            payload.photos = photos;
        }

        let server_record_id = self.record_id_for(session).await?;
        let mut record = DraftRecord::new(session.scope_key.clone(), server_record_id, payload);
        self.store.put(&mut record).await?;

        Ok(Outcome::from_reasons(record, reasons))
    }

    /// Start a debounced autosave task for one editing session.
    pub fn spawn_autosave(&self, session: DraftSession, debounce: Duration) -> AutosaveHandle {
        let (commands, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_autosave(self.clone(), session, debounce, receiver));
        AutosaveHandle { commands, task }
    }
}

enum AutosaveCommand {
    Edit(Box<FormState>),
    Flush(oneshot::Sender<Result<Option<DraftRecord>>>),
}

/// Handle to a running autosave task.
pub struct AutosaveHandle {
    commands: mpsc::UnboundedSender<AutosaveCommand>,
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    /// Replace the pending form and restart the debounce timer.
    pub fn schedule(&self, form: FormState) -> Result<()> {
        self.commands
            .send(AutosaveCommand::Edit(Box::new(form)))
            .map_err(|_| Error::TaskStopped("autosave"))
    }

    /// Save the pending form immediately; `None` when nothing was pending.
    pub async fn flush_now(&self) -> Result<Option<DraftRecord>> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(AutosaveCommand::Flush(reply))
            .map_err(|_| Error::TaskStopped("autosave"))?;
        response.await.map_err(|_| Error::TaskStopped("autosave"))?
    }

    /// Stop the task after saving whatever is still pending.
    pub async fn close(self) -> Result<()> {
        drop(self.commands);
        self.task.await.map_err(|_| Error::TaskStopped("autosave"))
    }
}

async fn run_autosave(
    saver: DraftSaver,
    session: DraftSession,
    debounce: Duration,
    mut commands: mpsc::UnboundedReceiver<AutosaveCommand>,
) {
    let mut pending: Option<FormState> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let fire_at = deadline;
        let timer = async move {
            match fire_at {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            command = commands.recv() => match command {
                Some(AutosaveCommand::Edit(form)) => {
                    pending = Some(*form);
                    deadline = Some(Instant::now() + debounce);
                }
                Some(AutosaveCommand::Flush(reply)) => {
                    deadline = None;
                    let result = save_pending(&saver, &session, &mut pending).await;
                    let _ = reply.send(result);
                }
                None => {
                    if let Err(error) = save_pending(&saver, &session, &mut pending).await {
                        tracing::error!("Final autosave for {} failed: {}", session.scope_key, error);
                    }
                    break;
                }
            },
            () = timer => {
                deadline = None;
                if let Err(error) = save_pending(&saver, &session, &mut pending).await {
                    tracing::error!("Autosave for {} failed: {}", session.scope_key, error);
                }
            }
        }
    }
}

async fn save_pending(
    saver: &DraftSaver,
    session: &DraftSession,
    pending: &mut Option<FormState>,
) -> Result<Option<DraftRecord>> {
    let Some(form) = pending.take() else {
        return Ok(None);
    };

    match saver.save(session, &form).await {
        Ok(outcome) => {
            for reason in outcome.reasons() {
                tracing::warn!("Draft for {} saved with original photo: {}", session.scope_key, reason);
            }
            Ok(outcome.into_value())
        }
        Err(error) => {
            // Keep the form so the next edit or flush retries the write.
            *pending = Some(form);
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerValue, CompositeKey, PhotoReference};
    use tempfile::{tempdir, TempDir};

    fn saver() -> (TempDir, DraftStore, DraftSaver) {
        let tmp = tempdir().unwrap();
        let store = DraftStore::open_in_memory().unwrap();
        let saver = DraftSaver::new(store.clone(), PhotoPromoter::new(tmp.path().join("durable")));
        (tmp, store, saver)
    }

    fn session() -> DraftSession {
        DraftSession::new(ScopeKey::new("tower-b").unwrap(), None)
    }

    fn form_with(answers: usize) -> FormState {
        let mut form = FormState::default();
        for index in 0..answers {
            form.answer(format!("q{index}"), AnswerValue::Boolean(true));
        }
        form
    }

    #[tokio::test]
    async fn save_promotes_photos_and_resets_retry_budget() {
        let (tmp, store, saver) = saver();
        let capture = tmp.path().join("IMG_9.jpg");
        std::fs::write(&capture, b"jpeg").unwrap();

        let mut stale = DraftRecord::new(session().scope_key, None, form_with(1).to_payload());
        stale.retry_count = 5;
        store.put(&mut stale).await.unwrap();

        let mut form = form_with(2);
        form.attach_photo(
            "gate",
            PhotoReference::new(capture.to_string_lossy(), "image/jpeg", "IMG_9.jpg"),
        );
        let outcome = saver.save(&session(), &form).await.unwrap();
        assert!(outcome.is_ok());

        let stored = store
            .get(&CompositeKey::unsynced(&session().scope_key))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.retry_count, 0);
        assert_eq!(stored.payload.answer_count(), 2);
        assert!(stored.payload.photos["gate"][0]
            .uri
            .starts_with(&*tmp.path().join("durable").to_string_lossy()));
    }

    #[tokio::test]
    async fn save_after_first_upload_targets_created_record() {
        let (_tmp, store, saver) = saver();
        let first = saver.save(&session(), &form_with(1)).await.unwrap().into_value().unwrap();
        store.complete_upload(&first, "srv-8").await.unwrap();

        let second = saver.save(&session(), &form_with(2)).await.unwrap().into_value().unwrap();
        assert_eq!(second.server_record_id.as_deref(), Some("srv-8"));
        assert_eq!(
            store.list_pending().await.unwrap(),
            vec![CompositeKey::new(&session().scope_key, Some("srv-8"))]
        );
    }

    #[tokio::test]
    async fn rapid_edits_collapse_into_one_write() {
        let (_tmp, store, saver) = saver();
        let handle = saver.spawn_autosave(session(), Duration::from_millis(20));

        for answers in 1..=4 {
            handle.schedule(form_with(answers)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let keys = store.list_pending().await.unwrap();
        assert_eq!(keys.len(), 1);
        let stored = store.get(&keys[0]).await.unwrap().unwrap();
        assert_eq!(stored.payload.answer_count(), 4);
        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn flush_now_saves_without_waiting() {
        let (_tmp, store, saver) = saver();
        let handle = saver.spawn_autosave(session(), Duration::from_secs(3600));

        assert!(handle.flush_now().await.unwrap().is_none());
        handle.schedule(form_with(3)).unwrap();
        let saved = handle.flush_now().await.unwrap().unwrap();
        assert_eq!(saved.payload.answer_count(), 3);
        assert_eq!(store.pending_count().await.unwrap(), 1);
        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_saves_pending_edit() {
        let (_tmp, store, saver) = saver();
        let handle = saver.spawn_autosave(session(), Duration::from_secs(3600));

        handle.schedule(form_with(2)).unwrap();
        handle.close().await.unwrap();

        assert_eq!(store.pending_count().await.unwrap(), 1);
    }
}
