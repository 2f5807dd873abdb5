//! Prometheus text-exposition endpoint (§10.1).

use std::sync::Arc;

use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use dtm_provider::ProviderClient;
use axum::extract::State;

use crate::error::{ApiError, ApiResult};
use crate::state::ApiState;

const PROMETHEUS_TEXT_FORMAT: &str = "text/plain; version=0.0.4";

pub async fn metrics<P: ProviderClient>(State(state): State<Arc<ApiState<P>>>) -> ApiResult<Response> {
    let rendered = state.metrics.render().map_err(|source| ApiError::Internal(source.to_string()))?;
    Ok(([(CONTENT_TYPE, PROMETHEUS_TEXT_FORMAT)], rendered).into_response())
}
