//! Aggregated operational statistics, combining the store, the rate gate,
//! and the validator's own counters (§10.5).

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use dtm_core::TorrentStatus;
use dtm_provider::ProviderClient;
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::ApiState;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    total_torrents: usize,
    failed_torrents: usize,
    symlink_broken_torrents: usize,
    attempts_last_24h: usize,
    successful_attempts_last_24h: usize,
    success_rate_last_24h: f64,
    rate_gate: RateGateStats,
    validator: ValidatorStats,
}

#[derive(Debug, Serialize)]
struct RateGateStats {
    total: usize,
    max_calls_per_minute: usize,
    per_tag: HashMap<String, usize>,
    recommendations: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ValidatorStats {
    cache_size: usize,
    cache_hits: u64,
    cache_misses: u64,
    denylist_size: usize,
}

pub async fn stats<P: ProviderClient>(State(state): State<Arc<ApiState<P>>>) -> ApiResult<Json<StatsResponse>> {
    let torrents = state.store.list_torrents().await?;
    let failed_torrents = torrents.iter().filter(|torrent| torrent.status.is_failed()).count();
    let symlink_broken_torrents = torrents.iter().filter(|torrent| torrent.status == TorrentStatus::SymlinkBroken).count();

    let since = Utc::now() - chrono::Duration::hours(24);
    let attempts = state.store.get_attempts_since(since).await?;
    let successful_attempts_last_24h = attempts.iter().filter(|attempt| attempt.success).count();
    let success_rate_last_24h = if attempts.is_empty() {
        0.0
    } else {
        successful_attempts_last_24h as f64 / attempts.len() as f64
    };

    let usage = state.rate_gate.current_usage().await;
    let recommendations = state
        .rate_gate
        .get_recommendations()
        .await
        .into_iter()
        .map(|recommendation| recommendation.message)
        .collect();
    let validator_stats = state.validator.stats().await;

    Ok(Json(StatsResponse {
        total_torrents: torrents.len(),
        failed_torrents,
        symlink_broken_torrents,
        attempts_last_24h: attempts.len(),
        successful_attempts_last_24h,
        success_rate_last_24h,
        rate_gate: RateGateStats {
            total: usage.total,
            max_calls_per_minute: usage.max_calls_per_minute,
            per_tag: usage.per_tag.into_iter().map(|(tag, count)| (tag.as_str().to_string(), count)).collect(),
            recommendations,
        },
        validator: ValidatorStats {
            cache_size: validator_stats.cache_size,
            cache_hits: validator_stats.cache_hits,
            cache_misses: validator_stats.cache_misses,
            denylist_size: validator_stats.denylist_size,
        },
    }))
}
