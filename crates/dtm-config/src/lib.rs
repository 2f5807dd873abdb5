#![deny(
    unsafe_code,
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! One typed configuration value, loaded once from the environment at
//! startup and handed down by reference to every component's constructor
//! (§9, §10.3). No component re-reads the environment at runtime.

mod error;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub use error::ConfigError;

/// Default admission ceiling for the rate gate (§4.1).
pub const DEFAULT_MAX_CALLS_PER_MINUTE: usize = 250;
/// Default per-torrent retry hold before a deferred retry or re-attempt.
pub const DEFAULT_RETRY_HOLD_HOURS: i64 = 3;
/// Default maximum number of retry-queue attempts (§3 RetryQueue).
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
/// Default minutes between `quick` catalog scans.
pub const DEFAULT_QUICK_SCAN_INTERVAL_MINUTES: u64 = 10;
/// Default hours between `full` catalog scans.
pub const DEFAULT_FULL_SCAN_INTERVAL_HOURS: u64 = 6;
/// Default hours between `symlinks` correlation scans.
pub const DEFAULT_SYMLINK_SCAN_INTERVAL_HOURS: u64 = 6;
/// Default page size for a `full` scan chunk.
pub const DEFAULT_FULL_SCAN_PAGE_SIZE: u32 = 1000;
/// Default maximum pages fetched per `full` scan invocation.
pub const DEFAULT_FULL_SCAN_MAX_PAGES: u32 = 5;
/// Default refresh window forcing a full symlink re-walk.
pub const DEFAULT_SYMLINK_REFRESH_HOURS: i64 = 24;
/// Default bounded worker pool size for symlink inspection.
pub const DEFAULT_SYMLINK_WALKER_CONCURRENCY: usize = 6;
/// Default SSE replay backlog capacity.
pub const DEFAULT_SSE_REPLAY_CAPACITY: usize = 256;
/// Default correlator promotion threshold (§4.6).
pub const DEFAULT_CORRELATOR_PROMOTE_THRESHOLD: f64 = 0.7;
/// Default failure-handler cleanup match threshold (§4.7).
pub const DEFAULT_CORRELATOR_CLEANUP_THRESHOLD: f64 = 0.6;
/// Default `ContinuousTester` batch size (§4.10).
pub const DEFAULT_TESTER_BATCH_SIZE: usize = 10;
/// Default retention window for `cleanup_old` (§4.4).
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
/// Default bind address for the control plane.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
/// Default base URL for the debrid provider's REST API.
pub const DEFAULT_PROVIDER_BASE_URL: &str = "https://api.real-debrid.com/rest/1.0";
/// Minimum accepted length for the provider API token.
pub const MIN_API_TOKEN_LEN: usize = 20;
/// Gap enforced between sequential downstream indexer notifications (§4.7).
pub const INDEXER_NOTIFY_SPACING: Duration = Duration::from_secs(2);

/// A downstream media indexer service notified after an orphan-link cleanup
/// (§4.7). The transport itself is out of the core's scope; this only
/// describes where to reach the service and which commands to send.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Service name (`sonarr` or `radarr`), used as a config-key prefix.
    pub name: String,
    /// Hostname or resolved container address.
    pub host: String,
    /// API port.
    pub port: u16,
    /// Path to the service's own config file, from which the API key is
    /// read (an `<ApiKey>` element in a `config.xml`, as the provider's own
    /// host services store it).
    pub api_key_config_path: PathBuf,
    /// Command names POSTed to this service's `/command` endpoint, in
    /// order, each spaced by [`INDEXER_NOTIFY_SPACING`].
    pub commands: Vec<String>,
}

/// The fully validated, process-wide configuration value.
#[derive(Debug, Clone)]
pub struct Config {
    /// Provider API token. At least [`MIN_API_TOKEN_LEN`] characters.
    pub provider_api_token: String,
    /// Base URL of the debrid provider's REST API.
    pub provider_base_url: String,
    /// Connection string for the embedded store (e.g. `sqlite:///data/dtm.db`).
    pub database_url: String,
    /// Root of the local media tree walked by the symlink walker.
    pub media_root: PathBuf,
    /// Maximum re-submission attempts before a torrent is excluded from
    /// [`crate::Config::retry_hold`]-gated candidate selection.
    pub max_retry_attempts: u32,
    /// Minutes between `quick` catalog scans.
    pub quick_scan_interval_minutes: u64,
    /// Hours between `full` catalog scans.
    pub full_scan_interval_hours: u64,
    /// Hours between `symlinks` correlation scans.
    pub symlink_scan_interval_hours: u64,
    /// Page size used by each `full` scan chunk.
    pub full_scan_page_size: u32,
    /// Maximum pages fetched per `full` scan invocation.
    pub full_scan_max_pages: u32,
    /// Maximum concurrent torrents considered per reinjection cycle.
    pub max_concurrent_torrents: usize,
    /// `tracing` env-filter level string.
    pub log_level: String,
    /// Whether to emit JSON-formatted logs (`true`) or pretty output.
    pub log_json: bool,
    /// Whether destructive operations (symlink deletion, downstream POSTs)
    /// are logged-but-skipped. Defaults to `true` (§10.5).
    pub dry_run: bool,
    /// Rate gate admission ceiling per rolling 60 s window.
    pub max_calls_per_minute: usize,
    /// Hold duration before a deferred retry becomes due.
    pub retry_hold: chrono::Duration,
    /// Refresh window forcing a full symlink re-walk.
    pub symlink_refresh_window: chrono::Duration,
    /// Bounded worker pool size for symlink inspection.
    pub symlink_walker_concurrency: usize,
    /// SSE replay backlog capacity.
    pub sse_replay_capacity: usize,
    /// Correlator promotion threshold (§4.6), stricter than the cleanup
    /// threshold by design (§9).
    pub correlator_promote_threshold: f64,
    /// Failure-handler cleanup match threshold (§4.7).
    pub correlator_cleanup_threshold: f64,
    /// `ContinuousTester` batch size.
    pub tester_batch_size: usize,
    /// Retention window, in days, for `cleanup_old`.
    pub retention_days: u32,
    /// Control-plane bind address.
    pub bind_addr: SocketAddr,
    /// Downstream indexers notified after an orphan-link cleanup.
    pub indexers: Vec<IndexerConfig>,
}

impl Config {
    /// Load configuration from the process environment, optionally seeded
    /// from a `.env` file in the current directory (development only; a
    /// missing file is not an error).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for a required variable that is
    /// absent, or [`ConfigError::Invalid`] when a present value fails
    /// validation. Validation failures are fatal at startup; `main` surfaces
    /// them as a descriptive message rather than panicking.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_env_inner()
    }

    fn from_env_inner() -> Result<Self, ConfigError> {
        let provider_api_token = require("PROVIDER_API_TOKEN")?;
        if provider_api_token.len() < MIN_API_TOKEN_LEN {
            return Err(ConfigError::invalid(
                "PROVIDER_API_TOKEN",
                format!("must be at least {MIN_API_TOKEN_LEN} characters"),
            ));
        }

        let provider_base_url = optional("PROVIDER_BASE_URL").unwrap_or_else(|| DEFAULT_PROVIDER_BASE_URL.to_string());

        let database_url = optional("DATABASE_URL").unwrap_or_else(|| "sqlite://dtm.db".to_string());

        let media_root = PathBuf::from(require("MEDIA_ROOT")?);

        let max_retry_attempts = parse_positive_u32("MAX_RETRY_ATTEMPTS", DEFAULT_MAX_RETRY_ATTEMPTS)?;
        let quick_scan_interval_minutes =
            parse_positive_u64("SCAN_INTERVAL_MINUTES", DEFAULT_QUICK_SCAN_INTERVAL_MINUTES)?;
        let full_scan_interval_hours =
            parse_positive_u64("FULL_SCAN_INTERVAL_HOURS", DEFAULT_FULL_SCAN_INTERVAL_HOURS)?;
        let symlink_scan_interval_hours =
            parse_positive_u64("SYMLINK_SCAN_INTERVAL_HOURS", DEFAULT_SYMLINK_SCAN_INTERVAL_HOURS)?;
        let full_scan_page_size = parse_positive_u32("FULL_SCAN_PAGE_SIZE", DEFAULT_FULL_SCAN_PAGE_SIZE)?;
        let full_scan_max_pages = parse_positive_u32("FULL_SCAN_MAX_PAGES", DEFAULT_FULL_SCAN_MAX_PAGES)?;
        let max_concurrent_torrents =
            parse_positive_usize("MAX_CONCURRENT_TORRENTS", 10)?;

        let log_level = optional("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_json = optional("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json"));
        let dry_run = parse_bool("DRY_RUN", true)?;

        let max_calls_per_minute = parse_positive_usize("RATE_GATE_MAX_PER_MINUTE", DEFAULT_MAX_CALLS_PER_MINUTE)?;
        let retry_hold_hours = parse_positive_i64("RETRY_HOLD_HOURS", DEFAULT_RETRY_HOLD_HOURS)?;
        let symlink_refresh_hours = parse_positive_i64("SYMLINK_REFRESH_HOURS", DEFAULT_SYMLINK_REFRESH_HOURS)?;
        let symlink_walker_concurrency =
            parse_positive_usize("SYMLINK_WALKER_CONCURRENCY", DEFAULT_SYMLINK_WALKER_CONCURRENCY)?;
        let sse_replay_capacity = parse_positive_usize("SSE_REPLAY_CAPACITY", DEFAULT_SSE_REPLAY_CAPACITY)?;
        let correlator_promote_threshold =
            parse_unit_interval("CORRELATOR_PROMOTE_THRESHOLD", DEFAULT_CORRELATOR_PROMOTE_THRESHOLD)?;
        let correlator_cleanup_threshold =
            parse_unit_interval("CORRELATOR_CLEANUP_THRESHOLD", DEFAULT_CORRELATOR_CLEANUP_THRESHOLD)?;
        let tester_batch_size = parse_positive_usize("TESTER_BATCH_SIZE", DEFAULT_TESTER_BATCH_SIZE)?;
        let retention_days = parse_positive_u32("HISTORY_RETENTION_DAYS", DEFAULT_RETENTION_DAYS)?;

        let bind_addr = optional("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|err| ConfigError::invalid("BIND_ADDR", err))?;

        let indexers = load_indexers()?;

        Ok(Self {
            provider_api_token,
            provider_base_url,
            database_url,
            media_root,
            max_retry_attempts,
            quick_scan_interval_minutes,
            full_scan_interval_hours,
            symlink_scan_interval_hours,
            full_scan_page_size,
            full_scan_max_pages,
            max_concurrent_torrents,
            log_level,
            log_json,
            dry_run,
            max_calls_per_minute,
            retry_hold: chrono::Duration::hours(retry_hold_hours),
            symlink_refresh_window: chrono::Duration::hours(symlink_refresh_hours),
            symlink_walker_concurrency,
            sse_replay_capacity,
            correlator_promote_threshold,
            correlator_cleanup_threshold,
            tester_batch_size,
            retention_days,
            bind_addr,
            indexers,
        })
    }
}

fn load_indexers() -> Result<Vec<IndexerConfig>, ConfigError> {
    const SERVICES: [(&str, u16, [&str; 2]); 2] = [
        ("sonarr", 8989, ["RescanSeries", "missingEpisodeSearch"]),
        ("radarr", 7878, ["RescanMovie", "MissingMoviesSearch"]),
    ];

    let mut indexers = Vec::with_capacity(SERVICES.len());
    for (name, default_port, commands) in SERVICES {
        let host_var: &'static str = Box::leak(format!("{}_HOST", name.to_ascii_uppercase()).into_boxed_str());
        let Some(host) = optional(host_var) else {
            continue;
        };
        let port_var: &'static str = Box::leak(format!("{}_PORT", name.to_ascii_uppercase()).into_boxed_str());
        let port = match optional(port_var) {
            Some(raw) => raw.parse::<u16>().map_err(|err| ConfigError::invalid(port_var, err))?,
            None => default_port,
        };
        let config_path_var: &'static str =
            Box::leak(format!("{}_CONFIG_PATH", name.to_ascii_uppercase()).into_boxed_str());
        let api_key_config_path = PathBuf::from(require(config_path_var)?);

        indexers.push(IndexerConfig {
            name: name.to_string(),
            host,
            port,
            api_key_config_path,
            commands: commands.iter().map(|c| (*c).to_string()).collect(),
        });
    }
    Ok(indexers)
}

fn optional(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    optional(var).ok_or(ConfigError::Missing { var })
}

fn parse_positive_u32(var: &'static str, default: u32) -> Result<u32, ConfigError> {
    match optional(var) {
        None => Ok(default),
        Some(raw) => raw.parse::<u32>().map_err(|err| ConfigError::invalid(var, err)),
    }
}

fn parse_positive_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match optional(var) {
        None => Ok(default),
        Some(raw) => raw.parse::<u64>().map_err(|err| ConfigError::invalid(var, err)),
    }
}

fn parse_positive_i64(var: &'static str, default: i64) -> Result<i64, ConfigError> {
    match optional(var) {
        None => Ok(default),
        Some(raw) => {
            let value = raw.parse::<i64>().map_err(|err| ConfigError::invalid(var, err))?;
            if value <= 0 {
                return Err(ConfigError::invalid(var, "must be positive"));
            }
            Ok(value)
        }
    }
}

fn parse_positive_usize(var: &'static str, default: usize) -> Result<usize, ConfigError> {
    match optional(var) {
        None => Ok(default),
        Some(raw) => {
            let value = raw.parse::<usize>().map_err(|err| ConfigError::invalid(var, err))?;
            if value == 0 {
                return Err(ConfigError::invalid(var, "must be greater than zero"));
            }
            Ok(value)
        }
    }
}

fn parse_unit_interval(var: &'static str, default: f64) -> Result<f64, ConfigError> {
    match optional(var) {
        None => Ok(default),
        Some(raw) => {
            let value = raw.parse::<f64>().map_err(|err| ConfigError::invalid(var, err))?;
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(var, "must be between 0.0 and 1.0"));
            }
            Ok(value)
        }
    }
}

fn parse_bool(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match optional(var) {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::invalid(var, "must be a boolean (true/false)")),
        },
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for (key, _) in std::env::vars() {
            if key == "PROVIDER_API_TOKEN"
                || key == "MEDIA_ROOT"
                || key == "DATABASE_URL"
                || key == "DRY_RUN"
                || key == "MAX_RETRY_ATTEMPTS"
                || key == "BIND_ADDR"
                || key.ends_with("_HOST")
                || key.ends_with("_PORT")
                || key.ends_with("_CONFIG_PATH")
            {
                unsafe { std::env::remove_var(key) };
            }
        }
    }

    #[test]
    #[serial]
    fn missing_required_token_is_an_error() {
        clear_env();
        let result = Config::from_env_inner();
        assert!(matches!(result, Err(ConfigError::Missing { var: "PROVIDER_API_TOKEN" })));
    }

    #[test]
    #[serial]
    fn short_token_is_rejected() {
        clear_env();
        unsafe {
            std::env::set_var("PROVIDER_API_TOKEN", "short");
            std::env::set_var("MEDIA_ROOT", "/media");
        }
        let result = Config::from_env_inner();
        assert!(matches!(result, Err(ConfigError::Invalid { var: "PROVIDER_API_TOKEN", .. })));
    }

    #[test]
    #[serial]
    fn defaults_apply_when_optional_vars_are_absent() {
        clear_env();
        unsafe {
            std::env::set_var("PROVIDER_API_TOKEN", "a".repeat(32));
            std::env::set_var("MEDIA_ROOT", "/media");
        }
        let config = Config::from_env_inner().expect("valid config");
        assert!(config.dry_run, "dry-run must default to true (§10.5)");
        assert_eq!(config.max_retry_attempts, DEFAULT_MAX_RETRY_ATTEMPTS);
        assert_eq!(config.max_calls_per_minute, DEFAULT_MAX_CALLS_PER_MINUTE);
        assert!(config.indexers.is_empty());
    }

    #[test]
    #[serial]
    fn indexer_requires_its_config_path_once_host_is_set() {
        clear_env();
        unsafe {
            std::env::set_var("PROVIDER_API_TOKEN", "a".repeat(32));
            std::env::set_var("MEDIA_ROOT", "/media");
            std::env::set_var("SONARR_HOST", "10.0.0.5");
        }
        let result = Config::from_env_inner();
        assert!(matches!(result, Err(ConfigError::Missing { var: "SONARR_CONFIG_PATH" })));
    }

    #[test]
    #[serial]
    fn indexer_loads_with_default_port() {
        clear_env();
        unsafe {
            std::env::set_var("PROVIDER_API_TOKEN", "a".repeat(32));
            std::env::set_var("MEDIA_ROOT", "/media");
            std::env::set_var("SONARR_HOST", "10.0.0.5");
            std::env::set_var("SONARR_CONFIG_PATH", "/config/sonarr/config.xml");
        }
        let config = Config::from_env_inner().expect("valid config");
        assert_eq!(config.indexers.len(), 1);
        assert_eq!(config.indexers[0].port, 8989);
        assert_eq!(config.indexers[0].commands, vec!["RescanSeries", "missingEpisodeSearch"]);
    }
}
