//! Selects failed torrents and drives a bounded re-submission cycle against
//! the provider (§4.8).

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dtm_core::{Attempt, Torrent, DRY_RUN_API_RESPONSE};
use dtm_events::{Event, EventBus};
use dtm_provider::ProviderClient;
use dtm_store::Store;
use dtm_telemetry::Metrics;
use dtm_validator::Validator;
use tracing::{info, warn};

use crate::error::WorkersResult;
use crate::failure_handler::{FailureHandler, FailureOutcome};

/// What happened to a single candidate handed to [`ReinjectionWorker::reinject`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReinjectOutcome {
    /// The provider accepted the re-submission.
    Success,
    /// The hash or magnet failed local validation; nothing was sent to the
    /// provider.
    Invalid {
        /// Why validation rejected the candidate.
        reason: String,
    },
    /// The provider rejected the re-submission; `outcome` is what
    /// [`FailureHandler`] did about it.
    Failed {
        /// The failure-handling outcome.
        outcome: FailureOutcome,
    },
}

/// Drives the failed-torrent re-submission cycle: selects a bounded batch
/// from the store, validates each candidate, and submits it to the provider,
/// handing rejections to a [`FailureHandler`] (§4.8, §9).
pub struct ReinjectionWorker<P: ProviderClient> {
    store: Store,
    provider: Arc<P>,
    validator: Arc<Validator>,
    events: EventBus,
    metrics: Arc<Metrics>,
    failure_handler: Arc<FailureHandler>,
    retry_hold: chrono::Duration,
    max_retry_attempts: u32,
    dry_run: bool,
}

impl<P: ProviderClient> ReinjectionWorker<P> {
    /// Build a worker. `failure_handler` is constructor-injected rather than
    /// held mutually with a reference back to this worker (§9): the cleanup
    /// worker, not this type, is what later re-drives a deferred retry.
    /// `validator` is shared with the control plane's `/stats` endpoint so
    /// both observe the same cache/denylist state.
    #[must_use]
    pub fn new(
        store: Store,
        provider: Arc<P>,
        validator: Arc<Validator>,
        events: EventBus,
        metrics: Arc<Metrics>,
        failure_handler: Arc<FailureHandler>,
        retry_hold: chrono::Duration,
        max_retry_attempts: u32,
        dry_run: bool,
    ) -> Self {
        Self {
            store,
            provider,
            validator,
            events,
            metrics,
            failure_handler,
            retry_hold,
            max_retry_attempts,
            dry_run,
        }
    }

    /// Fetch failed torrents eligible for re-submission, truncated to the
    /// provider's current candidate budget (§4.2, §4.8).
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::WorkersError`] if the store read fails.
    pub async fn select_candidates(&self, now: DateTime<Utc>) -> WorkersResult<Vec<Torrent>> {
        let mut candidates = self
            .store
            .get_failed_torrents(self.retry_hold, self.max_retry_attempts, now)
            .await?;
        let budget = self.provider.backoff().lock().await.candidate_count() as usize;
        candidates.truncate(budget);
        Ok(candidates)
    }

    /// Validate and re-submit a single candidate.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::WorkersError`] if a store write, magnet build,
    /// or failure-handling step fails. A provider rejection is not an
    /// error: it surfaces as `Ok(ReinjectOutcome::Failed { .. })`.
    pub async fn reinject(&self, torrent: &Torrent, now: DateTime<Utc>) -> WorkersResult<ReinjectOutcome> {
        self.events
            .publish(Event::ReinjectStart {
                torrent_id: torrent.id.clone(),
                filename: truncate(&torrent.filename, 50),
            })
            .await;

        let hash_verdict = self.validator.validate_hash(&torrent.hash).await;
        if !hash_verdict.ok {
            let detail = hash_verdict.reason.unwrap_or_else(|| "invalid hash".to_string());
            let reason = format!("Hash invalide: {detail}");
            self.record_invalid(torrent, &reason, now).await?;
            return Ok(ReinjectOutcome::Invalid { reason });
        }

        let magnet = match self.validator.build_magnet(&torrent.hash, Some(&torrent.filename)).await {
            Ok(magnet) => magnet,
            Err(source) => {
                let reason = source.to_string();
                self.record_invalid(torrent, &reason, now).await?;
                return Ok(ReinjectOutcome::Invalid { reason });
            }
        };

        if self.dry_run {
            info!(torrent_id = %torrent.id, "dry-run: simulating re-submission");
            let attempt = Attempt::success(torrent.id.clone(), now, 0, Some(DRY_RUN_API_RESPONSE.to_string()));
            self.store.record_attempt(&attempt).await?;
            self.metrics.record_reinject_attempt("dry_run");
            self.events
                .publish(Event::ReinjectComplete {
                    success: true,
                    torrent_id: torrent.id.clone(),
                    response_time_ms: 0,
                    error: None,
                })
                .await;
            return Ok(ReinjectOutcome::Success);
        }

        let started = Instant::now();
        let result = self.provider.add_magnet(&magnet).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(added) => {
                let attempt = Attempt::success(torrent.id.clone(), now, elapsed_ms, Some(added.uri));
                self.store.record_attempt(&attempt).await?;
                self.metrics.record_reinject_attempt("success");
                self.events
                    .publish(Event::ReinjectComplete {
                        success: true,
                        torrent_id: torrent.id.clone(),
                        response_time_ms: elapsed_ms,
                        error: None,
                    })
                    .await;
                Ok(ReinjectOutcome::Success)
            }
            Err(source) => {
                let message = source.to_string();
                let attempt = Attempt::failure(torrent.id.clone(), now, elapsed_ms, message.clone());
                self.store.record_attempt(&attempt).await?;
                self.metrics.record_reinject_attempt("failure");
                self.events
                    .publish(Event::ReinjectError {
                        torrent_id: torrent.id.clone(),
                        error: message.clone(),
                    })
                    .await;
                warn!(torrent_id = %torrent.id, error = %message, "re-submission rejected");
                let outcome = self.failure_handler.handle(torrent, &message, now).await?;
                Ok(ReinjectOutcome::Failed { outcome })
            }
        }
    }

    async fn record_invalid(&self, torrent: &Torrent, reason: &str, now: DateTime<Utc>) -> WorkersResult<()> {
        let attempt = Attempt::failure(torrent.id.clone(), now, 0, reason.to_string());
        self.store.record_attempt(&attempt).await?;
        self.metrics.record_reinject_attempt("invalid");
        self.events
            .publish(Event::ReinjectError {
                torrent_id: torrent.id.clone(),
                error: reason.to_string(),
            })
            .await;
        Ok(())
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtm_core::{Priority, TorrentStatus};
    use dtm_fsops::Correlator;
    use dtm_provider::StubProviderClient;
    use dtm_ratelimit::RateGate;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn torrent(hash: &str) -> Torrent {
        Torrent::new_observed("T1", hash, "My Show S01E01 1080p", TorrentStatus::Error, 1024, now())
    }

    async fn worker(dry_run: bool) -> (ReinjectionWorker<StubProviderClient>, Store) {
        let store = dtm_test_support::temp_store().await;
        let failure_handler = Arc::new(FailureHandler::new(
            store.clone(),
            Correlator::new(0.7, 0.6),
            Arc::new(RateGate::new(250)),
            Vec::new(),
            chrono::Duration::hours(3),
            true,
        ));
        let worker = ReinjectionWorker::new(
            store.clone(),
            Arc::new(StubProviderClient::new()),
            Arc::new(Validator::new()),
            EventBus::with_capacity(32),
            Arc::new(Metrics::new().unwrap()),
            failure_handler,
            chrono::Duration::hours(3),
            3,
            dry_run,
        );
        (worker, store)
    }

    #[tokio::test]
    async fn invalid_hash_never_reaches_the_provider() {
        let (worker, store) = worker(true).await;
        let outcome = worker.reinject(&torrent("not-a-hash"), now()).await.unwrap();
        match outcome {
            ReinjectOutcome::Invalid { reason } => assert!(
                reason.starts_with("Hash invalide: "),
                "expected the documented \"Hash invalide\" prefix, got {reason:?}"
            ),
            other => panic!("expected ReinjectOutcome::Invalid, got {other:?}"),
        }
        let torrent_row = store.get_torrent("T1").await.unwrap();
        assert!(torrent_row.is_none(), "candidate was never upserted by this test, only the attempt recorded");
    }

    #[tokio::test]
    async fn dry_run_records_a_synthetic_success() {
        let (worker, store) = worker(true).await;
        store.upsert_torrent(&torrent(&"a".repeat(40))).await.unwrap();
        let outcome = worker.reinject(&torrent(&"a".repeat(40)), now()).await.unwrap();
        assert_eq!(outcome, ReinjectOutcome::Success);
        let failed = store
            .get_failed_torrents(chrono::Duration::hours(3), 3, now() + chrono::Duration::days(1))
            .await
            .unwrap();
        assert!(failed.is_empty(), "successful attempt must clear failed-set eligibility by bumping last_attempt/last_success");
    }

    #[tokio::test]
    async fn candidate_selection_is_bounded_by_the_provider_backoff_budget() {
        let (worker, store) = worker(true).await;
        for i in 0..5 {
            let mut t = torrent(&"a".repeat(40));
            t.id = format!("T{i}");
            store.upsert_torrent(&t).await.unwrap();
        }
        worker.provider.backoff().lock().await.observe(dtm_provider::ResponseClass::RateLimited);
        let candidates = worker.select_candidates(now()).await.unwrap();
        assert!(candidates.len() <= 5);
    }
}
