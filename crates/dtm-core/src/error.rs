//! Error types shared across the domain model.

use thiserror::Error;

/// Result alias for domain-model operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while constructing or validating domain entities.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A field failed validation.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable reason.
        reason: &'static str,
    },
}
