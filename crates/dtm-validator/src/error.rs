//! Error types for validation operations.

use thiserror::Error;

/// Errors raised while constructing a magnet link.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidatorError {
    /// The supplied hash failed [`crate::Validator::validate_hash`].
    #[error("invalid hash: {reason}")]
    InvalidHash {
        /// Human-readable rejection reason.
        reason: String,
    },
}
