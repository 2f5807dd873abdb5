//! Error types for the event bus.

use thiserror::Error;

/// Errors raised while subscribing to or replaying the event stream.
#[derive(Debug, Error)]
pub enum EventError {
    /// The subscriber fell behind the broadcast channel's ring buffer.
    #[error("subscriber lagged; {skipped} events were dropped")]
    Lagged {
        /// Number of events the subscriber missed.
        skipped: u64,
    },
}
