//! Error types for the rate gate.

use thiserror::Error;

use crate::OperationTag;

/// Errors raised while acquiring a rate-gate slot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateGateError {
    /// No slot became available within the caller's timeout.
    #[error("timed out waiting for a {tag:?} rate-gate slot")]
    Timeout {
        /// The tag that was waiting.
        tag: OperationTag,
    },
}
