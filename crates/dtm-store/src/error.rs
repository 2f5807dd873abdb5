//! Error types for the persistence layer.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by the embedded store. A migration failure at startup is
/// fatal (§7); all other variants are propagated to the caller, which
/// decides whether to abort its unit of work.
#[derive(Debug)]
pub enum StoreError {
    /// Applying pending schema migrations failed.
    Migration {
        /// Underlying migration error.
        source: sqlx::migrate::MigrateError,
    },
    /// A query or transaction failed.
    Query {
        /// Operation identifier, for log correlation.
        operation: &'static str,
        /// Underlying SQL error.
        source: sqlx::Error,
    },
    /// A row referenced a status label the domain model does not recognise.
    UnknownStatus {
        /// The unrecognised label.
        value: String,
    },
}

impl Display for StoreError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Migration { .. } => formatter.write_str("store migration failed"),
            Self::Query { operation, .. } => write!(formatter, "store operation '{operation}' failed"),
            Self::UnknownStatus { value } => write!(formatter, "unrecognised status '{value}'"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Migration { source } => Some(source),
            Self::Query { source, .. } => Some(source),
            Self::UnknownStatus { .. } => None,
        }
    }
}

impl StoreError {
    pub(crate) fn query(operation: &'static str, source: sqlx::Error) -> Self {
        Self::Query { operation, source }
    }
}
