//! Control-plane error type and its HTTP rendering (§10.2).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by a control-plane handler. Each maps to a status code
/// and a small JSON body; no variant leaks an internal error's `Debug` form.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A store read or write failed.
    #[error("store operation failed: {0}")]
    Store(#[from] dtm_store::StoreError),
    /// A worker-pipeline call failed (reinjection, scan, failure handling).
    #[error("worker operation failed: {0}")]
    Workers(#[from] dtm_workers::WorkersError),
    /// The request body or query string failed validation.
    #[error("invalid request: {0}")]
    BadRequest(String),
    /// The referenced torrent does not exist in the catalog.
    #[error("torrent '{0}' not found")]
    NotFound(String),
    /// Something else failed on our side (metrics rendering, etc).
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Store(_) | Self::Workers(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody { error: self.to_string() };
        (status, Json(body)).into_response()
    }
}

/// Result alias used by every handler in this crate.
pub type ApiResult<T> = Result<T, ApiError>;
