//! Drives the symlink walk, correlates broken links against the catalog,
//! promotes confident matches, and batch-drains the result through
//! reinjection (§4.5, §4.6, §4.10).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use dtm_core::{SymlinkProcessingState, TorrentStatus};
use dtm_events::{Event, EventBus};
use dtm_fsops::{Correlator, SymlinkWalker};
use dtm_provider::ProviderClient;
use dtm_store::{NewSymlinkHistoryEntry, Store};
use dtm_telemetry::Metrics;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::WorkersResult;
use crate::reinject::ReinjectionWorker;

/// Summary of one [`ContinuousTester::run_cycle`] pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestCycleSummary {
    /// Broken links found by the walk (0 if the walk did not run this cycle).
    pub broken_found: u64,
    /// How many were matched and promoted to `symlink_broken`/high priority.
    pub promoted: u64,
    /// How many promoted torrents were drained through reinjection this
    /// cycle (bounded by the configured batch size).
    pub drained: u64,
}

/// Owns the symlink-walk checkpoint and drives the promote-then-drain cycle
/// that feeds the reinjection worker from local filesystem evidence rather
/// than provider-reported failures (§4.10).
pub struct ContinuousTester<P: ProviderClient> {
    store: Store,
    walker_root: PathBuf,
    walker_concurrency: usize,
    state_path: PathBuf,
    correlator: Correlator,
    events: EventBus,
    metrics: Arc<Metrics>,
    reinjector: Arc<ReinjectionWorker<P>>,
    refresh_window: chrono::Duration,
    batch_size: usize,
}

impl<P: ProviderClient> ContinuousTester<P> {
    /// Build a tester. `state_path` is the JSON checkpoint file alongside
    /// the database (§6); `batch_size` bounds how many promoted torrents are
    /// drained through `reinjector` per cycle.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        walker_root: PathBuf,
        walker_concurrency: usize,
        state_path: PathBuf,
        correlator: Correlator,
        events: EventBus,
        metrics: Arc<Metrics>,
        reinjector: Arc<ReinjectionWorker<P>>,
        refresh_window: chrono::Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            walker_root,
            walker_concurrency,
            state_path,
            correlator,
            events,
            metrics,
            reinjector,
            refresh_window,
            batch_size,
        }
    }

    /// Run one full cycle: walk (if due or resumable), correlate, promote,
    /// and drain a batch of the resulting `symlink_broken` torrents in
    /// lexicographic filename order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::WorkersError`] if the walk, store, or
    /// reinjection steps fail.
    pub async fn run_cycle(&self, now: DateTime<Utc>, cancel: CancellationToken) -> WorkersResult<TestCycleSummary> {
        let mut state = dtm_fsops::load_state(&self.state_path)?;
        let mut broken_found = 0u64;

        if state.needs_rescan(now, self.refresh_window) {
            broken_found = self.walk_and_record(&mut state, now, cancel).await?;
        }

        let promoted = self.correlate_and_promote(now).await?;
        let drained = self.drain_batch(now).await?;

        Ok(TestCycleSummary {
            broken_found,
            promoted,
            drained,
        })
    }

    async fn walk_and_record(
        &self,
        state: &mut SymlinkProcessingState,
        now: DateTime<Utc>,
        cancel: CancellationToken,
    ) -> WorkersResult<u64> {
        self.events
            .publish(Event::SymlinkScanStart {
                path: self.walker_root.to_string_lossy().into_owned(),
            })
            .await;

        let started = std::time::Instant::now();
        let walker = SymlinkWalker::new(self.walker_root.clone(), self.walker_concurrency, cancel);
        let outcome = walker.walk(state.clone(), now).await?;
        let elapsed = started.elapsed();

        for symlink in &outcome.broken {
            self.store
                .insert_symlink_history(&NewSymlinkHistoryEntry {
                    symlink: symlink.clone(),
                    recorded_at: now,
                })
                .await?;
        }

        self.metrics.observe_symlink_walk(elapsed.as_secs_f64());
        self.events
            .publish(Event::SymlinkScanComplete {
                total_broken: outcome.broken.len() as u64,
                scan_duration_ms: elapsed.as_millis() as u64,
                scan_path: self.walker_root.to_string_lossy().into_owned(),
            })
            .await;

        *state = outcome.state;
        dtm_fsops::save_state(&self.state_path, state)?;

        if outcome.cancelled {
            info!(path = %self.walker_root.display(), "symlink walk cancelled mid-pass, checkpoint saved");
        }

        Ok(outcome.broken.len() as u64)
    }

    async fn correlate_and_promote(&self, now: DateTime<Utc>) -> WorkersResult<u64> {
        self.events.publish(Event::SymlinkMatchStart).await;

        let history = self.store.list_symlink_history(10_000).await?;
        if history.is_empty() {
            self.events
                .publish(Event::SymlinkMatchComplete {
                    total_symlinks: 0,
                    matched_count: 0,
                    match_rate: 0.0,
                })
                .await;
            return Ok(0);
        }

        let catalog = self.store.list_torrents().await?;
        let mut matched = 0u64;

        for entry in &history {
            let Some(best) = self.correlator.best_match(&entry.torrent_name, &catalog) else {
                continue;
            };
            if best.torrent.status == TorrentStatus::SymlinkBroken {
                continue;
            }
            let mut promoted = best.torrent;
            promoted.promote_symlink_broken(now);
            self.store.upsert_torrent(&promoted).await?;
            matched += 1;
        }

        self.store.mark_symlink_history_processed().await?;

        let match_rate = matched as f64 / history.len() as f64;
        self.metrics.set_correlator_match_rate(match_rate);
        self.events
            .publish(Event::SymlinkMatchComplete {
                total_symlinks: history.len() as u64,
                matched_count: matched,
                match_rate,
            })
            .await;

        Ok(matched)
    }

    async fn drain_batch(&self, now: DateTime<Utc>) -> WorkersResult<u64> {
        let mut candidates: Vec<_> = self
            .store
            .list_torrents()
            .await?
            .into_iter()
            .filter(|torrent| torrent.status == TorrentStatus::SymlinkBroken)
            .collect();
        candidates.sort_by(|a, b| a.filename.cmp(&b.filename));
        candidates.truncate(self.batch_size);

        let mut drained = 0u64;
        for torrent in &candidates {
            match self.reinjector.reinject(torrent, now).await {
                Ok(_) => drained += 1,
                Err(error) => warn!(torrent_id = %torrent.id, %error, "continuous tester batch item failed"),
            }
        }
        Ok(drained)
    }

    /// Run [`Self::run_cycle`] on a fixed interval until `cancel` fires. Each
    /// tick gets its own child token so a cancellation mid-walk still lets
    /// the walker checkpoint cleanly before the loop exits.
    pub async fn run(&self, interval: StdDuration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("continuous tester shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    let now = Utc::now();
                    match self.run_cycle(now, cancel.child_token()).await {
                        Ok(summary) => info!(
                            broken_found = summary.broken_found,
                            promoted = summary.promoted,
                            drained = summary.drained,
                            "continuous tester cycle complete"
                        ),
                        Err(error) => warn!(%error, "continuous tester cycle failed"),
                    }
                }
            }
        }
    }
}
