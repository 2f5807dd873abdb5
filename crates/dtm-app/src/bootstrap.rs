//! Composition root (§9): loads configuration, constructs every component
//! exactly once, wires the dependency graph, and drives startup/shutdown.
//!
//! No component reaches for a global singleton or re-reads the environment;
//! everything a task or handler needs is handed to it here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dtm_config::Config;
use dtm_events::EventBus;
use dtm_fsops::Correlator;
use dtm_provider::HttpProviderClient;
use dtm_ratelimit::RateGate;
use dtm_store::Store;
use dtm_telemetry::{LogFormat, Metrics};
use dtm_validator::Validator;
use dtm_workers::{CleanupWorker, ContinuousTester, FailureHandler, ReinjectionWorker, Scheduler};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Load configuration, build the full dependency graph, and run until a
/// shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the store cannot be
/// opened/migrated, or the control-plane listener cannot be bound.
pub async fn run_app() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    dtm_telemetry::init_logging(&config.log_level, if config.log_json { LogFormat::Json } else { LogFormat::Pretty })?;

    if config.dry_run {
        info!("starting in dry-run mode: destructive operations are logged, not performed (§10.5)");
    }

    let store = Store::connect(&config.database_url).await?;
    let events = EventBus::with_capacity(config.sse_replay_capacity);
    let metrics = Arc::new(Metrics::new()?);
    let rate_gate = Arc::new(RateGate::new(config.max_calls_per_minute));
    let validator = Arc::new(Validator::new());
    let provider = Arc::new(HttpProviderClient::new(
        config.provider_base_url.clone(),
        config.provider_api_token.clone(),
        Arc::clone(&rate_gate),
    ));

    let failure_handler = Arc::new(FailureHandler::new(
        store.clone(),
        Correlator::new(config.correlator_promote_threshold, config.correlator_cleanup_threshold),
        Arc::clone(&rate_gate),
        config.indexers.clone(),
        config.retry_hold,
        config.dry_run,
    ));

    let reinjector = Arc::new(ReinjectionWorker::new(
        store.clone(),
        Arc::clone(&provider),
        Arc::clone(&validator),
        events.clone(),
        Arc::clone(&metrics),
        Arc::clone(&failure_handler),
        config.retry_hold,
        config.max_retry_attempts,
        config.dry_run,
    ));

    let cleanup = Arc::new(CleanupWorker::new(
        store.clone(),
        Arc::clone(&reinjector),
        config.max_retry_attempts,
        config.retry_hold,
    ));

    let tester = Arc::new(ContinuousTester::new(
        store.clone(),
        config.media_root.clone(),
        config.symlink_walker_concurrency,
        symlink_state_path(&config.database_url),
        Correlator::new(config.correlator_promote_threshold, config.correlator_cleanup_threshold),
        events.clone(),
        Arc::clone(&metrics),
        Arc::clone(&reinjector),
        config.symlink_refresh_window,
        config.tester_batch_size,
    ));

    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        Arc::clone(&provider),
        events.clone(),
        Arc::clone(&metrics),
        Arc::clone(&rate_gate),
    ));

    let cancel = CancellationToken::new();
    let scheduler_handles = scheduler.start(&config, Arc::clone(&tester), Arc::clone(&cleanup), cancel.child_token());

    let api_state = Arc::new(dtm_api::ApiState::new(
        store.clone(),
        events,
        Arc::clone(&metrics),
        Arc::clone(&rate_gate),
        validator,
        Arc::clone(&scheduler),
        tester,
        reinjector,
        config.full_scan_page_size,
        config.full_scan_max_pages,
    ));
    let router = dtm_api::router(api_state);
    let bind_addr = config.bind_addr;
    let server = tokio::spawn(async move { dtm_api::serve(router, bind_addr).await });

    shutdown_signal().await;
    info!("shutdown signal received, stopping background tasks");

    cancel.cancel();
    scheduler_handles.join().await;
    server.abort();

    store.cleanup_old(config.retention_days).await?;
    info!("shutdown complete");
    Ok(())
}

/// Derive the symlink-walk checkpoint path alongside the configured SQLite
/// database file (§6): `sqlite:///data/dtm.db` becomes `/data/dtm.db.symlinks.json`.
fn symlink_state_path(database_url: &str) -> PathBuf {
    let path = database_url.strip_prefix("sqlite://").unwrap_or(database_url);
    Path::new(path).with_extension("symlinks.json")
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            stream.recv().await;
        }
    };
    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symlink_state_path_sits_alongside_the_database_file() {
        assert_eq!(symlink_state_path("sqlite:///data/dtm.db"), PathBuf::from("/data/dtm.symlinks.json"));
        assert_eq!(symlink_state_path("sqlite://dtm.db"), PathBuf::from("dtm.symlinks.json"));
    }
}
