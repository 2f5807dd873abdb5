//! Tracing subscriber initialisation (§10.1).
//!
//! Installs a single global `tracing` subscriber with an `EnvFilter` that
//! defaults to `info` when `RUST_LOG` is unset, and either the human-readable
//! `fmt` layer or the `json` layer depending on [`LogFormat`].

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Result, TelemetryError};

/// Default logging target when `RUST_LOG` is not provided.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Output format for the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, single-line-per-event output, used in development.
    Pretty,
    /// Structured JSON output, used in production deployments.
    Json,
}

impl LogFormat {
    /// Parse a format name from configuration (`"json"` or anything else
    /// falls back to [`LogFormat::Pretty`]).
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::SubscriberInstall`] if a subscriber has already
/// been installed globally.
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json())
            .try_init()
            .map_err(|source| TelemetryError::SubscriberInstall { source }),
        LogFormat::Pretty => registry
            .with(fmt::layer())
            .try_init()
            .map_err(|source| TelemetryError::SubscriberInstall { source }),
    }
}
