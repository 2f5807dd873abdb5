//! Error types for the symlink walk and correlation pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for fsops operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors raised while walking or persisting symlink-walk state.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// An I/O failure outside of a single symlink inspection, e.g. reading a
    /// root directory's entries or persisting processing state.
    #[error("io error during {operation} at {path}: {source}")]
    Io {
        /// What the walker was doing.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The persisted processing-state document could not be parsed.
    #[error("malformed symlink processing state at {path}: {source}")]
    MalformedState {
        /// Path to the state document.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// The walk root does not exist or is not a directory.
    #[error("walk root {path} is not a usable directory")]
    InvalidRoot {
        /// The configured root.
        path: PathBuf,
    },
}

impl FsOpsError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
