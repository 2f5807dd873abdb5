//! Error types for configuration loading and validation.

use std::fmt;

use thiserror::Error;

/// Errors raised while loading or validating the application configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("missing required environment variable '{var}'")]
    Missing {
        /// Name of the missing variable.
        var: &'static str,
    },
    /// An environment variable's value failed validation.
    #[error("invalid value for '{var}': {reason}")]
    Invalid {
        /// Name of the offending variable.
        var: &'static str,
        /// Human-readable rejection reason.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(var: &'static str, reason: impl fmt::Display) -> Self {
        Self::Invalid {
            var,
            reason: reason.to_string(),
        }
    }
}
