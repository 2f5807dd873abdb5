#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Unified sliding-window rate limiter (§4.1). A single process-wide gate
//! admits at most `max_calls_per_minute` provider calls per rolling 60 s
//! window; every outbound call to the provider acquires a slot here first.

mod error;

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub use error::RateGateError;

/// Default admission ceiling per rolling 60 s window.
pub const DEFAULT_MAX_CALLS_PER_MINUTE: usize = 250;
/// Default per-call acquire timeout.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(60);
/// Width of the sliding window.
const WINDOW: Duration = Duration::from_secs(60);
/// Upper bound on a single sleep iteration while waiting for a slot.
const MAX_SLEEP_STEP: Duration = Duration::from_secs(1);
/// Floor on a single sleep iteration, mirroring the source's `max(0.1, ...)`.
const MIN_SLEEP_STEP: Duration = Duration::from_millis(100);
/// Upper bound on how long `wait_for_optimal_slot` holds out for a
/// below-share slot before forcing admission.
const OPTIMAL_WAIT_CEILING: Duration = Duration::from_secs(30);
/// Timeout used when `wait_for_optimal_slot` forces admission.
const FORCE_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Operation-type tag every caller must supply. Used for per-tag moving
/// averages and the advisory weighted-share mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationTag {
    /// Re-submission (reinjection) calls driven by the tester/cleanup loops.
    TestInjection,
    /// Catalog maintenance calls (delete, get_torrent, etc).
    CleanupRd,
    /// Downstream indexer notification POSTs.
    NotifyMedia,
}

impl OperationTag {
    /// Configured advisory share of the admission window, out of 100.
    #[must_use]
    pub const fn default_weight(self) -> u32 {
        match self {
            Self::TestInjection => 50,
            Self::CleanupRd => 30,
            Self::NotifyMedia => 20,
        }
    }

    /// Stable wire label matching the original operation-type tags.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TestInjection => "test_injection",
            Self::CleanupRd => "cleanup_rd",
            Self::NotifyMedia => "notify_media",
        }
    }
}

struct CallRecord {
    at: Instant,
    tag: OperationTag,
}

#[derive(Default)]
struct TagStats {
    avg_response_time_ms: f64,
    calls: u64,
    successes: u64,
}

struct GateState {
    window: VecDeque<CallRecord>,
    stats: [TagStats; 3],
}

impl GateState {
    fn stats_mut(&mut self, tag: OperationTag) -> &mut TagStats {
        &mut self.stats[tag as usize]
    }
}

/// The unified, process-wide rate gate.
pub struct RateGate {
    max_calls_per_minute: usize,
    state: Mutex<GateState>,
}

/// Snapshot of current admission usage, keyed by tag.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSnapshot {
    /// Calls admitted in the trailing 60 s window, per tag.
    pub per_tag: Vec<(OperationTag, usize)>,
    /// Total calls admitted in the trailing 60 s window.
    pub total: usize,
    /// Configured ceiling.
    pub max_calls_per_minute: usize,
}

/// A suggested adjustment surfaced by [`RateGate::get_recommendations`].
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    /// The over-share tag.
    pub tag: OperationTag,
    /// Its observed share of the trailing window.
    pub observed_share: f64,
    /// Its configured target share.
    pub target_share: f64,
    /// Human-readable suggestion, suitable for a `/stats` response.
    pub message: String,
}

impl RateGate {
    /// Build a gate admitting at most `max_calls_per_minute` calls per
    /// rolling 60 s window.
    #[must_use]
    pub fn new(max_calls_per_minute: usize) -> Self {
        Self {
            max_calls_per_minute,
            state: Mutex::new(GateState {
                window: VecDeque::new(),
                stats: [TagStats::default(), TagStats::default(), TagStats::default()],
            }),
        }
    }

    /// Acquire a slot for `tag`, blocking until one is available or
    /// `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`RateGateError::Timeout`] if no slot opened up within
    /// `timeout`.
    pub async fn acquire(&self, tag: OperationTag, timeout: Duration) -> Result<(), RateGateError> {
        let start = Instant::now();
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                purge_expired(&mut state.window, Instant::now());

                if state.window.len() < self.max_calls_per_minute {
                    state.window.push_back(CallRecord {
                        at: Instant::now(),
                        tag,
                    });
                    return Ok(());
                }

                let oldest = state
                    .window
                    .front()
                    .map_or(Instant::now(), |record| record.at);
                let available_at = oldest + WINDOW;
                available_at.saturating_duration_since(Instant::now())
            };

            if start.elapsed() >= timeout {
                return Err(RateGateError::Timeout { tag });
            }

            let step = wait.clamp(MIN_SLEEP_STEP, MAX_SLEEP_STEP);
            tracing::debug!(tag = tag.as_str(), wait_ms = step.as_millis() as u64, "rate gate waiting for a slot");
            tokio::time::sleep(step).await;

            if start.elapsed() >= timeout {
                return Err(RateGateError::Timeout { tag });
            }
        }
    }

    /// Acquire a slot using the default 60 s timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RateGateError::Timeout`] if no slot opened up in time.
    pub async fn acquire_default(&self, tag: OperationTag) -> Result<(), RateGateError> {
        self.acquire(tag, DEFAULT_ACQUIRE_TIMEOUT).await
    }

    /// Record the outcome of a completed call for the gate's moving-average
    /// bookkeeping. Does not affect admission.
    pub async fn record_completion(&self, tag: OperationTag, response_time_ms: f64, success: bool) {
        let mut state = self.state.lock().await;
        let stats = state.stats_mut(tag);
        stats.calls += 1;
        if success {
            stats.successes += 1;
        }
        stats.avg_response_time_ms = if stats.calls == 1 {
            response_time_ms
        } else {
            stats.avg_response_time_ms.mul_add(0.9, response_time_ms * 0.1)
        };
    }

    /// Current per-tag and total admission counts within the trailing
    /// window.
    pub async fn current_usage(&self) -> UsageSnapshot {
        let mut state = self.state.lock().await;
        purge_expired(&mut state.window, Instant::now());

        let tags = [
            OperationTag::TestInjection,
            OperationTag::CleanupRd,
            OperationTag::NotifyMedia,
        ];
        let per_tag = tags
            .into_iter()
            .map(|tag| {
                let count = state.window.iter().filter(|record| record.tag == tag).count();
                (tag, count)
            })
            .collect();

        UsageSnapshot {
            per_tag,
            total: state.window.len(),
            max_calls_per_minute: self.max_calls_per_minute,
        }
    }

    /// The instant at which the oldest admitted call will expire from the
    /// window, freeing a slot. `None` if the window is not currently full.
    pub async fn next_available_time(&self) -> Option<Instant> {
        let mut state = self.state.lock().await;
        purge_expired(&mut state.window, Instant::now());
        if state.window.len() < self.max_calls_per_minute {
            return None;
        }
        state.window.front().map(|record| record.at + WINDOW)
    }

    /// Whether `tag`'s admitted share of the trailing window exceeds its
    /// configured weighted share, used by [`Self::wait_for_optimal_slot`].
    async fn exceeds_share(&self, tag: OperationTag) -> bool {
        let usage = self.current_usage().await;
        if usage.total == 0 {
            return false;
        }
        let tag_count = usage
            .per_tag
            .iter()
            .find(|(candidate, _)| *candidate == tag)
            .map_or(0, |(_, count)| *count);
        let current_ratio = tag_count as f64 / usage.total as f64;
        let target_ratio = f64::from(tag.default_weight()) / 100.0;
        current_ratio > target_ratio * 1.2
    }

    /// Advisory per-tag share recommendations (§10.5): for every tag whose
    /// trailing-window share exceeds its configured weight by more than 20%,
    /// a suggestion to throttle that tag or route it through
    /// [`Self::wait_for_optimal_slot`]. Empty when the window is empty or no
    /// tag is currently over-share.
    pub async fn get_recommendations(&self) -> Vec<Recommendation> {
        let usage = self.current_usage().await;
        if usage.total == 0 {
            return Vec::new();
        }
        usage
            .per_tag
            .into_iter()
            .filter_map(|(tag, count)| {
                let observed_share = count as f64 / usage.total as f64;
                let target_share = f64::from(tag.default_weight()) / 100.0;
                (observed_share > target_share * 1.2).then(|| Recommendation {
                    tag,
                    observed_share,
                    target_share,
                    message: format!(
                        "{} is at {:.0}% of admitted calls, above its {:.0}% configured share; consider \
                         wait_for_optimal_slot or reducing its call rate",
                        tag.as_str(),
                        observed_share * 100.0,
                        target_share * 100.0,
                    ),
                })
            })
            .collect()
    }

    /// Advisory mode (§4.1's "wait for optimal slot"): refuses admission
    /// while `tag` exceeds its configured share, retrying for up to 30 s
    /// before forcing admission with a short timeout. Priority is purely
    /// advisory; callers that need strict FIFO should use [`Self::acquire`]
    /// directly.
    ///
    /// # Errors
    ///
    /// Returns [`RateGateError::Timeout`] if even the forced acquire fails.
    pub async fn wait_for_optimal_slot(&self, tag: OperationTag) -> Result<(), RateGateError> {
        let start = Instant::now();
        while start.elapsed() < OPTIMAL_WAIT_CEILING {
            if !self.exceeds_share(tag).await {
                return self.acquire_default(tag).await;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        self.acquire(tag, FORCE_ACQUIRE_TIMEOUT).await
    }
}

fn purge_expired(window: &mut VecDeque<CallRecord>, now: Instant) {
    while let Some(front) = window.front() {
        if now.saturating_duration_since(front.at) >= WINDOW {
            window.pop_front();
        } else {
            break;
        }
    }
}

impl std::fmt::Debug for RateGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGate")
            .field("max_calls_per_minute", &self.max_calls_per_minute)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_the_configured_ceiling() {
        let gate = RateGate::new(3);
        for _ in 0..3 {
            gate.acquire_default(OperationTag::TestInjection)
                .await
                .expect("slot available");
        }
        let usage = gate.current_usage().await;
        assert_eq!(usage.total, 3);
    }

    #[tokio::test]
    async fn fourth_call_times_out_quickly_when_window_is_full() {
        let gate = RateGate::new(1);
        gate.acquire_default(OperationTag::CleanupRd)
            .await
            .expect("first slot");
        let result = gate
            .acquire(OperationTag::CleanupRd, Duration::from_millis(150))
            .await;
        assert!(matches!(result, Err(RateGateError::Timeout { .. })));
    }

    #[tokio::test]
    async fn record_completion_tracks_ema() {
        let gate = RateGate::new(10);
        gate.record_completion(OperationTag::TestInjection, 100.0, true)
            .await;
        gate.record_completion(OperationTag::TestInjection, 200.0, true)
            .await;
        let state = gate.state.lock().await;
        let stats = &state.stats[OperationTag::TestInjection as usize];
        assert_eq!(stats.calls, 2);
        assert!((stats.avg_response_time_ms - 110.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn recommendations_flag_tags_exceeding_their_share() {
        let gate = RateGate::new(20);
        for _ in 0..10 {
            gate.acquire_default(OperationTag::NotifyMedia).await.unwrap();
        }
        gate.acquire_default(OperationTag::TestInjection).await.unwrap();

        let recommendations = gate.get_recommendations().await;
        assert!(recommendations.iter().any(|rec| rec.tag == OperationTag::NotifyMedia));
        assert!(!recommendations.iter().any(|rec| rec.tag == OperationTag::TestInjection));
    }

    #[tokio::test]
    async fn no_recommendations_on_an_empty_window() {
        let gate = RateGate::new(20);
        assert!(gate.get_recommendations().await.is_empty());
    }

    #[tokio::test]
    async fn usage_snapshot_splits_by_tag() {
        let gate = RateGate::new(10);
        gate.acquire_default(OperationTag::TestInjection).await.unwrap();
        gate.acquire_default(OperationTag::NotifyMedia).await.unwrap();
        let usage = gate.current_usage().await;
        assert_eq!(usage.total, 2);
        assert_eq!(
            usage
                .per_tag
                .iter()
                .find(|(tag, _)| *tag == OperationTag::TestInjection)
                .map(|(_, count)| *count),
            Some(1)
        );
    }
}
