//! Owns the long-running task set and the periodic catalog/symlink scan
//! triggers, coordinating a single [`CancellationToken`] across all of them
//! for graceful shutdown (§4.11).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use dtm_config::Config;
use dtm_core::{Metric, ScanKind, ScanStatus, Torrent};
use dtm_events::{Event, EventBus};
use dtm_provider::{ProviderClient, StatusFilter};
use dtm_ratelimit::RateGate;
use dtm_store::{ScanProgressUpdate, Store};
use dtm_telemetry::Metrics;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cleanup::CleanupWorker;
use crate::error::WorkersResult;
use crate::tester::ContinuousTester;

/// Default interval between monitoring-task snapshots.
pub const DEFAULT_MONITOR_INTERVAL: StdDuration = StdDuration::from_secs(300);

/// Join handles for every task the scheduler spawned, kept so a caller can
/// await clean termination after cancelling the shared token.
pub struct SchedulerHandles {
    handles: Vec<JoinHandle<()>>,
}

impl SchedulerHandles {
    /// Await every spawned task. Intended to run after the caller has
    /// cancelled the [`CancellationToken`] passed to [`Scheduler::start`].
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(error) = handle.await {
                warn!(%error, "scheduler task panicked");
            }
        }
    }
}

/// Starts and owns the tester, cleanup, monitoring, and periodic-scan tasks
/// that the provider-backed catalog relies on to stay current (§4.11).
pub struct Scheduler<P: ProviderClient> {
    store: Store,
    provider: Arc<P>,
    events: EventBus,
    metrics: Arc<Metrics>,
    rate_gate: Arc<RateGate>,
}

impl<P: ProviderClient + 'static> Scheduler<P> {
    /// Build a scheduler around the shared components every task needs.
    #[must_use]
    pub fn new(store: Store, provider: Arc<P>, events: EventBus, metrics: Arc<Metrics>, rate_gate: Arc<RateGate>) -> Self {
        Self {
            store,
            provider,
            events,
            metrics,
            rate_gate,
        }
    }

    /// Spawn every owned task, reading cadences from `config`. Returns the
    /// join handles; cancelling `cancel` stops every task cooperatively.
    pub fn start(
        &self,
        config: &Config,
        tester: Arc<ContinuousTester<P>>,
        cleanup: Arc<CleanupWorker<P>>,
        cancel: CancellationToken,
    ) -> SchedulerHandles {
        let mut handles = Vec::new();

        {
            let tester = Arc::clone(&tester);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                tester.run(StdDuration::from_secs(config.symlink_scan_interval_hours * 3600), cancel).await;
            }));
        }

        {
            let cleanup = Arc::clone(&cleanup);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                cleanup.run(crate::cleanup::DEFAULT_CLEANUP_INTERVAL, cancel).await;
            }));
        }

        handles.push(self.spawn_monitor(cancel.clone()));
        handles.push(self.spawn_quick_scan(config.quick_scan_interval_minutes, cancel.clone()));
        handles.push(self.spawn_full_scan(
            config.full_scan_interval_hours,
            config.full_scan_page_size,
            config.full_scan_max_pages,
            cancel,
        ));

        SchedulerHandles { handles }
    }

    /// Run one `quick` scan pass immediately, outside the scheduled cadence.
    /// Used by the control plane's on-demand scan trigger.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::WorkersError`] if the provider or store call
    /// fails.
    pub async fn trigger_quick_scan(&self) -> WorkersResult<()> {
        Self::run_quick_scan(&self.store, self.provider.as_ref(), &self.events).await
    }

    /// Advance the `full` scan cursor by at most `max_pages` pages of
    /// `page_size` rows immediately, outside the scheduled cadence. Used by
    /// the control plane's on-demand scan trigger.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::WorkersError`] if the provider or store call
    /// fails.
    pub async fn trigger_full_scan(&self, page_size: u32, max_pages: u32) -> WorkersResult<()> {
        Self::run_full_scan_chunk(&self.store, self.provider.as_ref(), &self.events, page_size, max_pages).await
    }

    fn spawn_monitor(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let store = self.store.clone();
        let rate_gate = Arc::clone(&self.rate_gate);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(DEFAULT_MONITOR_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("monitoring task shutting down");
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Err(error) = Self::record_snapshot(&store, &rate_gate).await {
                            warn!(%error, "monitoring snapshot failed");
                        }
                    }
                }
            }
        })
    }

    async fn record_snapshot(store: &Store, rate_gate: &RateGate) -> WorkersResult<()> {
        let now = Utc::now();
        let torrents = store.list_torrents().await?;
        let tests_performed = torrents.len() as f64;
        let infringing_detected = torrents
            .iter()
            .filter(|torrent| torrent.status == dtm_core::TorrentStatus::SymlinkBroken)
            .count() as f64;
        let cleanups_completed = store.get_unprocessed_permanent_failures().await?.len() as f64;
        let usage = rate_gate.current_usage().await;
        let utilization = if usage.max_calls_per_minute == 0 {
            0.0
        } else {
            usage.total as f64 / usage.max_calls_per_minute as f64
        };

        for (name, value) in [
            ("tests_performed", tests_performed),
            ("infringing_detected", infringing_detected),
            ("cleanups_completed", cleanups_completed),
            ("rate_gate_utilization", utilization),
        ] {
            store
                .record_metric(&Metric {
                    id: None,
                    recorded_at: now,
                    name: name.to_string(),
                    value,
                    tags: serde_json::json!({}),
                })
                .await?;
        }
        Ok(())
    }

    fn spawn_quick_scan(&self, interval_minutes: u64, cancel: CancellationToken) -> JoinHandle<()> {
        let store = self.store.clone();
        let provider = Arc::clone(&self.provider);
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(StdDuration::from_secs(interval_minutes * 60));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("quick scan trigger shutting down");
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Err(error) = Self::run_quick_scan(&store, provider.as_ref(), &events).await {
                            warn!(%error, "quick scan failed");
                        }
                    }
                }
            }
        })
    }

    async fn run_quick_scan(store: &Store, provider: &P, events: &EventBus) -> WorkersResult<()> {
        events
            .publish(Event::ScanStart {
                scan_type: "quick".to_string(),
            })
            .await;

        let now = Utc::now();
        store
            .update_scan_progress(
                ScanKind::Quick,
                ScanProgressUpdate {
                    current_offset: 0,
                    total_expected: None,
                    status: ScanStatus::Running,
                    scan_started: Some(now),
                    scan_completed: None,
                },
            )
            .await?;

        let observed = provider.get_torrents(StatusFilter::All, 1000, 0).await?;
        let mut failed = 0u64;
        for item in &observed {
            let status = dtm_core::TorrentStatus::from_str(&item.status).unwrap_or(dtm_core::TorrentStatus::Error);
            if status.is_failed() {
                failed += 1;
            }
            let torrent = Torrent::new_observed(item.id.clone(), item.hash.clone(), item.filename.clone(), status, item.size, now);
            store.upsert_torrent(&torrent).await?;
        }

        let completed = Utc::now();
        store
            .update_scan_progress(
                ScanKind::Quick,
                ScanProgressUpdate {
                    current_offset: 0,
                    total_expected: Some(observed.len() as u64),
                    status: ScanStatus::Completed,
                    scan_started: None,
                    scan_completed: Some(completed),
                },
            )
            .await?;

        events
            .publish(Event::ScanComplete {
                summary: serde_json::json!({"scan_type": "quick", "total": observed.len(), "failed": failed}),
            })
            .await;

        Ok(())
    }

    fn spawn_full_scan(&self, interval_hours: u64, page_size: u32, max_pages: u32, cancel: CancellationToken) -> JoinHandle<()> {
        let store = self.store.clone();
        let provider = Arc::clone(&self.provider);
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(StdDuration::from_secs(interval_hours * 3600));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("full scan trigger shutting down");
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Err(error) = Self::run_full_scan_chunk(&store, provider.as_ref(), &events, page_size, max_pages).await {
                            warn!(%error, "full scan chunk failed");
                            events
                                .publish(Event::ScanError {
                                    error: error.to_string(),
                                })
                                .await;
                        }
                    }
                }
            }
        })
    }

    /// Resume the `full` scan cursor and advance it by at most `max_pages`
    /// pages of `page_size` rows, marking the cursor `completed` once a page
    /// returns fewer rows than requested (§4.11, acceptance test 5).
    async fn run_full_scan_chunk(store: &Store, provider: &P, events: &EventBus, page_size: u32, max_pages: u32) -> WorkersResult<()> {
        let mut cursor = store.get_scan_progress(ScanKind::Full).await?;
        events
            .publish(Event::ScanStart {
                scan_type: "full".to_string(),
            })
            .await;

        let started = if cursor.status == ScanStatus::Running {
            None
        } else {
            Some(Utc::now())
        };
        let mut total_processed = 0u64;
        let mut finished = false;

        for _ in 0..max_pages {
            let now = Utc::now();
            let page = provider
                .get_torrents(StatusFilter::All, page_size, cursor.current_offset as u32)
                .await?;
            let page_len = page.len() as u64;

            for item in &page {
                let status = dtm_core::TorrentStatus::from_str(&item.status).unwrap_or(dtm_core::TorrentStatus::Error);
                let torrent = Torrent::new_observed(item.id.clone(), item.hash.clone(), item.filename.clone(), status, item.size, now);
                store.upsert_torrent(&torrent).await?;
            }
            total_processed += page_len;

            if page_len < u64::from(page_size) {
                finished = true;
                cursor.current_offset = 0;
                store
                    .update_scan_progress(
                        ScanKind::Full,
                        ScanProgressUpdate {
                            current_offset: 0,
                            total_expected: cursor.total_expected,
                            status: ScanStatus::Completed,
                            scan_started: started,
                            scan_completed: Some(now),
                        },
                    )
                    .await?;
                break;
            }

            cursor.current_offset += page_len;
            store
                .update_scan_progress(
                    ScanKind::Full,
                    ScanProgressUpdate {
                        current_offset: cursor.current_offset,
                        total_expected: cursor.total_expected,
                        status: ScanStatus::Running,
                        scan_started: started,
                        scan_completed: None,
                    },
                )
                .await?;
        }

        events
            .publish(Event::ScanComplete {
                summary: serde_json::json!({"scan_type": "full", "processed": total_processed, "completed": finished}),
            })
            .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtm_provider::StubProviderClient;

    fn now() -> chrono::DateTime<Utc> {
        chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn quick_scan_upserts_observed_torrents() {
        let store = dtm_test_support::temp_store().await;
        let provider = StubProviderClient::new();
        provider
            .seed(vec![dtm_provider::ProviderTorrent {
                id: "t1".to_string(),
                hash: "a".repeat(40),
                filename: "movie.mkv".to_string(),
                status: "downloaded".to_string(),
                size: 10,
                added: now().to_rfc3339(),
            }])
            .await;
        let events = EventBus::with_capacity(16);

        Scheduler::<StubProviderClient>::run_quick_scan(&store, &provider, &events).await.unwrap();

        let stored = store.list_torrents().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "t1");
    }

    #[tokio::test]
    async fn full_scan_resumes_across_invocations() {
        let store = dtm_test_support::temp_store().await;
        let provider = StubProviderClient::new();
        let torrents: Vec<_> = (0..1500)
            .map(|index| dtm_provider::ProviderTorrent {
                id: format!("t{index}"),
                hash: format!("{index:040}"),
                filename: format!("file-{index}.mkv"),
                status: "downloaded".to_string(),
                size: 10,
                added: now().to_rfc3339(),
            })
            .collect();
        provider.seed(torrents).await;
        let events = EventBus::with_capacity(16);

        Scheduler::<StubProviderClient>::run_full_scan_chunk(&store, &provider, &events, 1000, 1)
            .await
            .unwrap();
        let cursor = store.get_scan_progress(ScanKind::Full).await.unwrap();
        assert_eq!(cursor.current_offset, 1000);
        assert_eq!(cursor.status, ScanStatus::Running);

        Scheduler::<StubProviderClient>::run_full_scan_chunk(&store, &provider, &events, 1000, 1)
            .await
            .unwrap();
        let cursor = store.get_scan_progress(ScanKind::Full).await.unwrap();
        assert_eq!(cursor.current_offset, 0);
        assert_eq!(cursor.status, ScanStatus::Completed);
    }
}
