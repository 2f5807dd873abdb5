//! Error types for the provider client.

use thiserror::Error;

/// Result alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors raised by [`crate::ProviderClient`] implementations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The configured rate gate timed out before a slot opened up.
    #[error("rate gate timeout: {0}")]
    RateGate(#[from] dtm_ratelimit::RateGateError),
    /// The underlying HTTP transport failed before a response was received.
    #[error("transport error calling {operation}: {source}")]
    Transport {
        /// The provider method that was being called.
        operation: &'static str,
        /// Underlying transport failure.
        #[source]
        source: reqwest::Error,
    },
    /// The provider returned a classified, non-transport failure.
    #[error("provider call {operation} failed: {classified}")]
    Provider {
        /// The provider method that was being called.
        operation: &'static str,
        /// The classification assigned to the response (§4.2).
        classified: crate::ResponseClass,
        /// Raw message extracted from the response body, when present.
        message: Option<String>,
    },
}

impl ProviderError {
    /// The [`crate::ResponseClass`] this error corresponds to, used by
    /// `FailureHandler` to decide the destructive-vs-deferred path.
    #[must_use]
    pub fn classify(&self) -> crate::ResponseClass {
        match self {
            Self::RateGate(_) => crate::ResponseClass::RateLimited,
            Self::Transport { .. } => crate::ResponseClass::TransportTimeout,
            Self::Provider { classified, .. } => *classified,
        }
    }
}
