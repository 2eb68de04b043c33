//! Flush coordination over the pending set.
//!
//! The coordinator owns the single flush slot and the published status;
//! nothing else mutates either.

use std::time::Duration;

use tokio::sync::{watch, Mutex};

use super::executor::{SyncAttempt, SyncExecutor};
use crate::api::ChecklistApi;
use crate::config::RetryPolicy;
use crate::credentials::CredentialStore;
use crate::models::{CompositeKey, SyncStatus};
use crate::services::DraftStore;
use crate::util::unix_millis_now;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Triggered by connectivity coming back; honors the retry cap only.
    Automatic,
    /// Backoff retry while online; honors the retry cap and backoff.
    Scheduled,
    /// Requested by the user; attempts every pending draft.
    Manual,
}

/// Per-flush tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub success: usize,
    pub failed: usize,
    /// Drafts left alone because of the retry cap or backoff.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Completed(FlushReport),
    /// Another flush held the slot; nothing was attempted.
    AlreadyRunning,
}

pub struct SyncQueue<A, C> {
    store: DraftStore,
    executor: SyncExecutor<A, C>,
    retry: RetryPolicy,
    flush_slot: Mutex<()>,
    status: watch::Sender<SyncStatus>,
}

impl<A: ChecklistApi, C: CredentialStore> SyncQueue<A, C> {
    pub fn new(store: DraftStore, executor: SyncExecutor<A, C>, retry: RetryPolicy) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            store,
            executor,
            retry,
            flush_slot: Mutex::new(()),
            status,
        }
    }

    pub const fn store(&self) -> &DraftStore {
        &self.store
    }

    pub const fn executor(&self) -> &SyncExecutor<A, C> {
        &self.executor
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Last published status.
    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Refresh the pending count and publish.
    pub async fn publish(&self) -> Result<SyncStatus> {
        let pending = self.store.pending_count().await?;
        self.status.send_modify(|status| status.pending_syncs = pending);
        Ok(self.status())
    }

    /// Record the network state and publish; returns whether this was a
    /// transition into online.
    pub async fn set_online(&self, online: bool) -> Result<bool> {
        let came_online = self.mark_online(online);
        self.publish().await?;
        Ok(came_online)
    }

    /// Publish the network state without touching the store.
    pub fn mark_online(&self, online: bool) -> bool {
        let mut came_online = false;
        self.status.send_modify(|status| {
            came_online = online && !status.is_online;
            status.is_online = online;
        });
        came_online
    }

    /// Attempt every pending draft, one at a time.
    pub async fn flush(&self, mode: FlushMode) -> Result<FlushOutcome> {
        let Ok(_slot) = self.flush_slot.try_lock() else {
            tracing::debug!("Flush requested while another flush is running");
            self.publish().await?;
            return Ok(FlushOutcome::AlreadyRunning);
        };

        self.status.send_modify(|status| status.is_syncing = true);
        let result = self.flush_pending(mode).await;
        self.status.send_modify(|status| status.is_syncing = false);
        self.publish().await?;

        result.map(FlushOutcome::Completed)
    }

    /// Manually attempt one draft, holding the same slot as a full flush.
    pub async fn sync_key(&self, key: &CompositeKey) -> Result<FlushOutcome> {
        let Ok(_slot) = self.flush_slot.try_lock() else {
            self.publish().await?;
            return Ok(FlushOutcome::AlreadyRunning);
        };

        let record = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("draft {key}")))?;

        self.status.send_modify(|status| status.is_syncing = true);
        let result = self.executor.sync_one(&record).await;
        self.status.send_modify(|status| status.is_syncing = false);
        self.publish().await?;

        let mut report = FlushReport::default();
        if result?.is_uploaded() {
            report.success = 1;
        } else {
            report.failed = 1;
        }
        Ok(FlushOutcome::Completed(report))
    }

    /// Time until the earliest failed draft leaves its backoff window.
    ///
    /// `None` when no pending draft is waiting on backoff (nothing failed, or
    /// every failed draft has used up its retry budget).
    pub async fn next_retry_delay(&self) -> Result<Option<Duration>> {
        let now_ms = unix_millis_now();
        let due_at = self
            .store
            .pending_records()
            .await?
            .iter()
            .filter(|record| record.retry_count > 0 && !self.retry.is_exhausted(record.retry_count))
            .map(|record| {
                let delay_ms = i64::try_from(self.retry.backoff_delay(record.retry_count).as_millis())
                    .unwrap_or(i64::MAX);
                record
                    .last_attempt_at_ms
                    .unwrap_or(now_ms)
                    .saturating_add(delay_ms)
            })
            .min();

        Ok(due_at.map(|due_at_ms| {
            Duration::from_millis(u64::try_from(due_at_ms.saturating_sub(now_ms)).unwrap_or(0))
        }))
    }

    async fn flush_pending(&self, mode: FlushMode) -> Result<FlushReport> {
        let pending = self.publish().await?.pending_syncs;
        tracing::info!("Flushing {} pending draft(s) ({:?})", pending, mode);

        let now_ms = unix_millis_now();
        let mut report = FlushReport::default();

        for key in self.store.list_pending().await? {
            // Discarded while the flush was running.
            let Some(record) = self.store.get(&key).await? else {
                continue;
            };

            let allowed = match mode {
                FlushMode::Manual => true,
                FlushMode::Automatic => !self.retry.is_exhausted(record.retry_count),
                FlushMode::Scheduled => self.retry.allows_automatic_attempt(
                    record.retry_count,
                    record.last_attempt_at_ms,
                    now_ms,
                ),
            };
            if !allowed {
                tracing::debug!(key = %key, retry_count = record.retry_count, "Skipping draft");
                report.skipped += 1;
                continue;
            }

            match self.executor.sync_one(&record).await? {
                SyncAttempt::Uploaded { .. } => report.success += 1,
                SyncAttempt::Failed { .. } => report.failed += 1,
            }
            self.publish().await?;
        }

        tracing::info!(
            success = report.success,
            failed = report.failed,
            skipped = report.skipped,
            "Flush finished"
        );
        Ok(report)
    }
}
