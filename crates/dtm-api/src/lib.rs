#![forbid(unsafe_code)]
#![deny(
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

//! Control-plane HTTP surface (§4.12, §6): torrent listing and control,
//! broken-symlink history, aggregated stats, and the live SSE event channel.

mod error;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::Request;
use axum::routing::{delete, get, post};
use dtm_provider::ProviderClient;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

/// Build the full control-plane router over `state`.
#[must_use]
pub fn router<P: ProviderClient + 'static>(state: Arc<ApiState<P>>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
        tracing::info_span!("http.request", method = %request.method(), path = %request.uri().path())
    });

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(handlers::metrics::metrics::<P>))
        .route("/torrents", get(handlers::torrents::list_torrents::<P>))
        .route("/torrents/scan", post(handlers::torrents::trigger_scan::<P>))
        .route("/torrents/reinject", post(handlers::torrents::trigger_reinject::<P>))
        .route("/torrents/{id}", delete(handlers::torrents::delete_torrent::<P>))
        .route("/symlinks/broken", get(handlers::symlinks::list_broken_symlinks::<P>))
        .route("/symlinks/scan", post(handlers::symlinks::trigger_symlink_scan::<P>))
        .route("/stats", get(handlers::stats::stats::<P>))
        .route("/events", get(handlers::events::stream_events::<P>))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(trace).layer(cors))
}

/// Serve `router` on `addr` until the process is killed.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server loop
/// fails.
pub async fn serve(router: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!(%addr, "control plane listening");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router.into_make_service()).await?;
    Ok(())
}
