//! Classification of provider responses and the adaptive backoff that reacts
//! to them (§4.2).

use std::fmt;
use std::time::Duration;

/// Coarse outcome bucket assigned to a provider call, used both to steer
/// [`AdaptiveBackoff`] and by `FailureHandler` to pick the destructive-vs-
/// deferred cleanup path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// The call completed and the response was usable.
    Success,
    /// The provider rejected the credentials.
    AuthFailure,
    /// The provider signalled the caller is over its rate budget.
    RateLimited,
    /// The transport gave up waiting for a response.
    TransportTimeout,
    /// The transport failed before a response arrived.
    TransportError,
    /// The provider returned a 5xx-class failure.
    ServerError,
}

impl fmt::Display for ResponseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::AuthFailure => "auth_failure",
            Self::RateLimited => "rate_limited",
            Self::TransportTimeout => "transport_timeout",
            Self::TransportError => "transport_error",
            Self::ServerError => "server_error",
        };
        f.write_str(label)
    }
}

impl ResponseClass {
    /// Classify an HTTP status code into a [`ResponseClass`].
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            401 | 403 => Self::AuthFailure,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::ServerError,
        }
    }
}

/// Per-cycle candidate budget adjusted by [`AdaptiveBackoff`] alongside the
/// delay: how many torrents a caller may submit in the next testing cycle.
const DEFAULT_CANDIDATE_CAP: u32 = 50;

/// Tracks a provider's current backoff delay and the reinjection worker's
/// per-cycle candidate allowance, both adjusted in response to the
/// [`ResponseClass`] of each call (§4.2).
#[derive(Debug, Clone)]
pub struct AdaptiveBackoff {
    min_delay: Duration,
    max_delay: Duration,
    current_delay: Duration,
    success_streak: u32,
    candidate_count: u32,
    candidate_cap: u32,
}

impl AdaptiveBackoff {
    /// Build a backoff tracker starting at `min_delay`.
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            current_delay: min_delay,
            success_streak: 0,
            candidate_count: DEFAULT_CANDIDATE_CAP,
            candidate_cap: DEFAULT_CANDIDATE_CAP,
        }
    }

    /// The delay a caller should wait before its next call.
    #[must_use]
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// The number of candidates a cycle may submit under the current budget.
    #[must_use]
    pub fn candidate_count(&self) -> u32 {
        self.candidate_count
    }

    /// Feed the outcome of a call into the tracker, adjusting delay and
    /// candidate budget per §4.2.
    pub fn observe(&mut self, class: ResponseClass) {
        match class {
            ResponseClass::RateLimited => {
                self.success_streak = 0;
                let scaled = self.current_delay.mul_f64(3.0);
                self.current_delay = scaled.min(self.max_delay);
                self.candidate_count = self.candidate_count.saturating_sub(2).max(1);
            }
            ResponseClass::Success => {
                self.success_streak += 1;
                if self.success_streak >= 5 {
                    self.success_streak = 0;
                    let relaxed = self.current_delay.div_f64(1.1);
                    self.current_delay = relaxed.max(self.min_delay);
                    self.candidate_count = (self.candidate_count + 1).min(self.candidate_cap);
                }
            }
            ResponseClass::AuthFailure | ResponseClass::TransportTimeout | ResponseClass::TransportError | ResponseClass::ServerError => {
                self.success_streak = 0;
                let scaled = self.current_delay.mul_f64(1.5);
                self.current_delay = scaled.min(self.max_delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_successes_relax_delay_and_raise_candidates() {
        let mut backoff = AdaptiveBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
        backoff.current_delay = Duration::from_secs(10);
        backoff.candidate_count = 10;
        backoff.candidate_cap = 20;
        for _ in 0..4 {
            backoff.observe(ResponseClass::Success);
        }
        assert_eq!(backoff.current_delay, Duration::from_secs(10), "no relaxation before 5 successes");
        backoff.observe(ResponseClass::Success);
        assert!(backoff.current_delay < Duration::from_secs(10));
        assert_eq!(backoff.candidate_count, 11);
    }

    #[test]
    fn rate_limit_triples_delay_and_cuts_candidates() {
        let mut backoff = AdaptiveBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
        backoff.current_delay = Duration::from_secs(5);
        backoff.candidate_count = 4;
        backoff.observe(ResponseClass::RateLimited);
        assert_eq!(backoff.current_delay, Duration::from_secs(15));
        assert_eq!(backoff.candidate_count, 2);
    }

    #[test]
    fn candidate_count_floors_at_one() {
        let mut backoff = AdaptiveBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
        backoff.candidate_count = 2;
        backoff.observe(ResponseClass::RateLimited);
        backoff.observe(ResponseClass::RateLimited);
        assert_eq!(backoff.candidate_count, 1);
    }

    #[test]
    fn other_errors_scale_by_one_point_five_without_touching_candidates() {
        let mut backoff = AdaptiveBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
        backoff.current_delay = Duration::from_secs(4);
        backoff.candidate_count = 10;
        backoff.observe(ResponseClass::ServerError);
        assert_eq!(backoff.current_delay, Duration::from_secs(6));
        assert_eq!(backoff.candidate_count, 10);
    }

    #[test]
    fn delay_never_exceeds_max() {
        let mut backoff = AdaptiveBackoff::new(Duration::from_secs(1), Duration::from_secs(10));
        backoff.current_delay = Duration::from_secs(9);
        backoff.observe(ResponseClass::RateLimited);
        assert_eq!(backoff.current_delay, Duration::from_secs(10));
    }
}
