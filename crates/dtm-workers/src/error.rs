//! Error types for the reinjection/cleanup/failure-handling pipeline.

use thiserror::Error;

/// Result alias for worker operations.
pub type WorkersResult<T> = Result<T, WorkersError>;

/// Errors raised by the reinjection, failure-handling, cleanup, and
/// continuous-testing loops. Every variant is caught at a long-running
/// task's top frame and logged rather than propagated (§7).
#[derive(Debug, Error)]
pub enum WorkersError {
    /// A store read or write failed.
    #[error("store operation failed: {0}")]
    Store(#[from] dtm_store::StoreError),
    /// A provider call failed outside of the classified-failure path (the
    /// classified path is handled by [`crate::FailureHandler`] instead).
    #[error("provider call failed: {0}")]
    Provider(#[from] dtm_provider::ProviderError),
    /// A filesystem walk or checkpoint operation failed.
    #[error("filesystem operation failed: {0}")]
    FsOps(#[from] dtm_fsops::FsOpsError),
    /// Building a magnet link from a stored hash failed, which can only
    /// happen if a row's hash was corrupted after passing validation once.
    #[error("magnet build failed: {0}")]
    Validator(#[from] dtm_validator::ValidatorError),
    /// A rate-gate acquire timed out.
    #[error("rate gate: {0}")]
    RateGate(#[from] dtm_ratelimit::RateGateError),
    /// Reading a downstream indexer's own API key from its config file
    /// failed.
    #[error("reading indexer config at {path}: {source}")]
    IndexerConfig {
        /// Path to the indexer's config file.
        path: std::path::PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// A downstream indexer's config file did not contain a recognisable
    /// `<ApiKey>` element.
    #[error("no <ApiKey> element found in indexer config at {path}")]
    IndexerApiKeyMissing {
        /// Path to the indexer's config file.
        path: std::path::PathBuf,
    },
    /// The notification POST to a downstream indexer failed.
    #[error("notifying indexer {service} failed: {source}")]
    IndexerNotify {
        /// Indexer service name.
        service: String,
        /// Underlying transport failure.
        #[source]
        source: reqwest::Error,
    },
}
