//! Network-state driven auto-sync.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use super::queue::{FlushMode, FlushOutcome, SyncQueue};
use crate::api::ChecklistApi;
use crate::credentials::CredentialStore;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    Online,
    Offline,
}

/// Turns network events into status updates and automatic flushes.
pub struct ConnectivityWatcher<A, C> {
    queue: Arc<SyncQueue<A, C>>,
}

impl<A: ChecklistApi, C: CredentialStore> ConnectivityWatcher<A, C> {
    pub const fn new(queue: Arc<SyncQueue<A, C>>) -> Self {
        Self { queue }
    }

    /// Publish the new state and flush on a transition into online.
    ///
    /// Returns the flush outcome when a flush was triggered.
    pub async fn handle(&self, event: NetworkEvent) -> Result<Option<FlushOutcome>> {
        let came_online = self.queue.set_online(event == NetworkEvent::Online).await?;
        if !came_online {
            return Ok(None);
        }
        tracing::info!("Connectivity restored; flushing pending drafts");
        self.queue.flush(FlushMode::Automatic).await.map(Some)
    }

    /// Consume events until the sender side closes.
    ///
    /// Events that arrive during a flush are still published immediately.
    /// While online, drafts that failed are retried once their backoff
    /// window has passed.
    pub async fn run(&self, mut events: mpsc::Receiver<NetworkEvent>) {
        let mut flush: Option<Pin<Box<dyn Future<Output = Result<FlushOutcome>> + '_>>> = None;
        let mut retry_at: Option<Instant> = None;

        loop {
            let wake_at = retry_at;
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    // The paused flush may be queued on the store lock, so only
                    // the status is touched while it is in flight.
                    let came_online = self.queue.mark_online(event == NetworkEvent::Online);
                    if event == NetworkEvent::Offline {
                        retry_at = None;
                    }
                    if flush.is_some() {
                        continue;
                    }
                    if came_online {
                        tracing::info!("Connectivity restored; flushing pending drafts");
                        retry_at = None;
                        flush = Some(Box::pin(self.queue.flush(FlushMode::Automatic)));
                    } else if let Err(error) = self.queue.publish().await {
                        tracing::error!("Failed to publish sync status: {}", error);
                    }
                }
                result = async {
                    match flush.as_mut() {
                        Some(running) => running.await,
                        None => std::future::pending().await,
                    }
                }, if flush.is_some() => {
                    flush = None;
                    log_flush(result);
                    retry_at = self.schedule_retry().await;
                }
                () = async {
                    match wake_at {
                        Some(at) => sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                }, if flush.is_none() && wake_at.is_some() => {
                    retry_at = None;
                    if self.queue.status().is_online {
                        tracing::debug!("Backoff elapsed; retrying failed drafts");
                        flush = Some(Box::pin(self.queue.flush(FlushMode::Scheduled)));
                    }
                }
            }
        }

        if let Some(running) = flush {
            log_flush(running.await);
        }
        tracing::debug!("Network event stream closed; connectivity watcher stopped");
    }

    /// Deadline for the next backoff retry, if online and a draft is waiting.
    async fn schedule_retry(&self) -> Option<Instant> {
        if !self.queue.status().is_online {
            return None;
        }
        match self.queue.next_retry_delay().await {
            Ok(delay) => delay.map(|delay| {
                tracing::debug!("Next backoff retry in {:?}", delay);
                Instant::now() + delay
            }),
            Err(error) => {
                tracing::error!("Failed to schedule backoff retry: {}", error);
                None
            }
        }
    }
}

fn log_flush(result: Result<FlushOutcome>) {
    match result {
        Ok(FlushOutcome::Completed(report)) => {
            tracing::info!(
                success = report.success,
                failed = report.failed,
                skipped = report.skipped,
                "Automatic flush finished"
            );
        }
        Ok(FlushOutcome::AlreadyRunning) => {
            tracing::debug!("Automatic flush skipped; manual flush in progress");
        }
        Err(error) => tracing::error!("Automatic flush failed: {}", error),
    }
}
