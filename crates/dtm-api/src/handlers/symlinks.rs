//! Broken-symlink history and on-demand correlation scan (§4.12, §6).

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::Utc;
use dtm_core::BrokenSymlink;
use dtm_provider::ProviderClient;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ApiResult;
use crate::state::ApiState;

/// `GET /symlinks/broken` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct BrokenSymlinksQuery {
    limit: Option<u32>,
    processed: Option<bool>,
}

pub async fn list_broken_symlinks<P: ProviderClient>(
    State(state): State<Arc<ApiState<P>>>,
    Query(query): Query<BrokenSymlinksQuery>,
) -> ApiResult<Json<Vec<BrokenSymlink>>> {
    let limit = query.limit.unwrap_or(500).min(5000);
    let symlinks = state.store.list_symlink_history_filtered(limit, query.processed).await?;
    Ok(Json(symlinks))
}

/// `POST /symlinks/scan` response body.
#[derive(Debug, Serialize)]
pub struct SymlinkScanResponse {
    broken_found: u64,
    promoted: u64,
    drained: u64,
}

pub async fn trigger_symlink_scan<P: ProviderClient + 'static>(State(state): State<Arc<ApiState<P>>>) -> ApiResult<Json<SymlinkScanResponse>> {
    let summary = state.tester.run_cycle(Utc::now(), CancellationToken::new()).await?;
    Ok(Json(SymlinkScanResponse {
        broken_found: summary.broken_found,
        promoted: summary.promoted,
        drained: summary.drained,
    }))
}
