//! Torrent listing, on-demand scan, reinjection, and deletion endpoints
//! (§4.12, §6).

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use dtm_core::{Torrent, TorrentStatus};
use dtm_provider::ProviderClient;
use dtm_workers::{FailureOutcome, ReinjectOutcome};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiResult};
use crate::state::ApiState;

/// `GET /torrents` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct TorrentsQuery {
    status: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

pub async fn list_torrents<P: ProviderClient>(
    State(state): State<Arc<ApiState<P>>>,
    Query(query): Query<TorrentsQuery>,
) -> ApiResult<Json<Vec<Torrent>>> {
    let mut torrents = state.store.list_torrents().await?;

    if let Some(status) = query.status.as_deref() {
        if status.eq_ignore_ascii_case("failed") {
            torrents.retain(|torrent| torrent.status.is_failed());
        } else {
            let parsed = TorrentStatus::from_str(status).ok_or_else(|| ApiError::BadRequest(format!("unknown status '{status}'")))?;
            torrents.retain(|torrent| torrent.status == parsed);
        }
    }

    let limit = query.limit.unwrap_or(1000).min(1000) as usize;
    let offset = query.offset.unwrap_or(0) as usize;
    let page = torrents.into_iter().skip(offset).take(limit).collect();
    Ok(Json(page))
}

/// `POST /torrents/scan` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    Quick,
    Full,
    Symlinks,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    mode: ScanMode,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    mode: &'static str,
    summary: serde_json::Value,
}

pub async fn trigger_scan<P: ProviderClient + 'static>(
    State(state): State<Arc<ApiState<P>>>,
    Json(request): Json<ScanRequest>,
) -> ApiResult<Json<ScanResponse>> {
    match request.mode {
        ScanMode::Quick => {
            state.scheduler.trigger_quick_scan().await?;
            Ok(Json(ScanResponse {
                mode: "quick",
                summary: serde_json::json!({"dispatched": true}),
            }))
        }
        ScanMode::Full => {
            state
                .scheduler
                .trigger_full_scan(state.full_scan_page_size, state.full_scan_max_pages)
                .await?;
            Ok(Json(ScanResponse {
                mode: "full",
                summary: serde_json::json!({"dispatched": true}),
            }))
        }
        ScanMode::Symlinks => {
            let summary = state.tester.run_cycle(Utc::now(), CancellationToken::new()).await?;
            Ok(Json(ScanResponse {
                mode: "symlinks",
                summary: serde_json::json!({
                    "broken_found": summary.broken_found,
                    "promoted": summary.promoted,
                    "drained": summary.drained,
                }),
            }))
        }
    }
}

/// `POST /torrents/reinject` request body.
#[derive(Debug, Deserialize)]
pub struct ReinjectRequest {
    torrent_ids: Vec<String>,
}

/// Per-id outcome of a manual reinjection request.
#[derive(Debug, Serialize)]
pub struct ReinjectItemResult {
    torrent_id: String,
    outcome: String,
    detail: Option<String>,
}

pub async fn trigger_reinject<P: ProviderClient>(
    State(state): State<Arc<ApiState<P>>>,
    Json(request): Json<ReinjectRequest>,
) -> ApiResult<Json<Vec<ReinjectItemResult>>> {
    let now = Utc::now();
    let mut results = Vec::with_capacity(request.torrent_ids.len());

    for torrent_id in request.torrent_ids {
        let Some(torrent) = state.store.get_torrent(&torrent_id).await? else {
            results.push(ReinjectItemResult {
                torrent_id,
                outcome: "not_found".to_string(),
                detail: None,
            });
            continue;
        };
        let outcome = state.reinjector.reinject(&torrent, now).await?;
        let (outcome_label, detail) = describe_outcome(outcome);
        results.push(ReinjectItemResult {
            torrent_id,
            outcome: outcome_label,
            detail,
        });
    }

    Ok(Json(results))
}

fn describe_outcome(outcome: ReinjectOutcome) -> (String, Option<String>) {
    match outcome {
        ReinjectOutcome::Success => ("success".to_string(), None),
        ReinjectOutcome::Invalid { reason } => ("invalid".to_string(), Some(reason)),
        ReinjectOutcome::Failed { outcome } => {
            let detail = match outcome {
                FailureOutcome::Permanent { deleted_links } => format!("permanent: {deleted_links} orphan link(s) cleaned up"),
                FailureOutcome::Deferred => "deferred to retry queue".to_string(),
                FailureOutcome::Unknown => "unclassified provider rejection".to_string(),
            };
            ("failed".to_string(), Some(detail))
        }
    }
}

/// `DELETE /torrents/{id}` response body.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    success: bool,
}

pub async fn delete_torrent<P: ProviderClient>(State(state): State<Arc<ApiState<P>>>, Path(id): Path<String>) -> ApiResult<Json<DeleteResponse>> {
    state.store.delete_torrent(&id).await?;
    Ok(Json(DeleteResponse { success: true }))
}
