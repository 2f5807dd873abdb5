//! Periodic drain of the deferred retry queue, re-driving reinjection for
//! rows whose hold has elapsed (§4.9, §9).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use dtm_core::{Priority, Torrent, TorrentStatus};
use dtm_provider::ProviderClient;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::WorkersResult;
use crate::reinject::{ReinjectOutcome, ReinjectionWorker};

/// Default interval between retry-queue drain passes.
pub const DEFAULT_CLEANUP_INTERVAL: StdDuration = StdDuration::from_secs(300);

/// Drains due [`dtm_store::Store`] retry-queue rows and hands them back to
/// a [`ReinjectionWorker`], closing the loop that [`crate::FailureHandler`]'s
/// deferred path opened without ever holding a reference to the worker
/// itself (§9).
pub struct CleanupWorker<P: ProviderClient> {
    store: dtm_store::Store,
    reinjector: Arc<ReinjectionWorker<P>>,
    max_retry_attempts: u32,
    retry_backoff: chrono::Duration,
}

impl<P: ProviderClient> CleanupWorker<P> {
    /// Build a worker around a shared [`ReinjectionWorker`].
    #[must_use]
    pub fn new(
        store: dtm_store::Store,
        reinjector: Arc<ReinjectionWorker<P>>,
        max_retry_attempts: u32,
        retry_backoff: chrono::Duration,
    ) -> Self {
        Self {
            store,
            reinjector,
            max_retry_attempts,
            retry_backoff,
        }
    }

    /// Run one drain pass: every due row is reconstructed into a minimal
    /// [`Torrent`] and re-submitted; success deletes the row, failure bumps
    /// its retry counter (auto-pruned once `max_retry_attempts` is reached).
    ///
    /// Returns the number of rows processed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::WorkersError`] if a store read/write fails.
    pub async fn drain_due(&self, now: DateTime<Utc>) -> WorkersResult<usize> {
        let due = self.store.get_pending_retries(now).await?;
        let mut processed = 0usize;

        for entry in due {
            if !entry.is_due(now, self.max_retry_attempts) {
                continue;
            }
            let Some(id) = entry.id else { continue };

            let torrent = match self.store.get_torrent(&entry.torrent_id).await? {
                Some(torrent) => torrent,
                None => Torrent::new_observed(
                    entry.torrent_id.clone(),
                    String::new(),
                    entry.filename.clone(),
                    TorrentStatus::Error,
                    0,
                    now,
                ),
            };
            let torrent = Torrent {
                priority: Priority::High,
                ..torrent
            };

            let resolved = self.reinjector.reinject(&torrent, now).await?;
            match &resolved {
                ReinjectOutcome::Success | ReinjectOutcome::Invalid { .. } => {
                    info!(torrent_id = %entry.torrent_id, outcome = ?resolved, "retry queue row resolved");
                    self.store.delete_retry_queue(id).await?;
                }
                ReinjectOutcome::Failed { outcome } => {
                    warn!(torrent_id = %entry.torrent_id, ?outcome, "retry queue row still failing, rescheduling");
                    let next_scheduled = now + self.retry_backoff;
                    self.store
                        .bump_retry_attempt(id, now, next_scheduled, self.max_retry_attempts)
                        .await?;
                }
            }
            processed += 1;
        }

        Ok(processed)
    }

    /// Run [`Self::drain_due`] on a fixed interval until `cancel` fires.
    pub async fn run(&self, interval: StdDuration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("cleanup worker shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    let now = Utc::now();
                    match self.drain_due(now).await {
                        Ok(count) if count > 0 => info!(count, "drained retry queue"),
                        Ok(_) => {}
                        Err(error) => warn!(%error, "retry queue drain failed"),
                    }
                }
            }
        }
    }
}
