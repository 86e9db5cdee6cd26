//! Error types for fdw-ingest

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Run-level failure of a fact load.
///
/// Per-record problems never surface here; they become rejections.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A sink write kept failing after every retry attempt
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    SinkExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: fdw_common::Error,
    },

    /// The record stream itself failed (unreadable file, broken CSV framing)
    #[error("Record stream failed: {0}")]
    Stream(String),

    /// Caller cancelled the run
    #[error("Load cancelled after {rows_committed} committed rows")]
    Cancelled { rows_committed: u64 },

    /// Caller-supplied deadline elapsed
    #[error("Load timed out after {elapsed:?} with {rows_committed} committed rows")]
    TimedOut { elapsed: Duration, rows_committed: u64 },

    /// Invalid arguments; the run is not touched
    #[error("Invalid load request: {0}")]
    InvalidRequest(String),

    /// Run tracker or dimension lookup failure outside chunk processing
    #[error(transparent)]
    Common(#[from] fdw_common::Error),
}

impl From<csv::Error> for LoadError {
    fn from(err: csv::Error) -> Self {
        LoadError::Stream(err.to_string())
    }
}

/// Result type for loader operations
pub type LoadResult<T> = Result<T, LoadError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., the same file is already loading
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Common error: {0}")]
    Common(#[from] fdw_common::Error),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(fdw_common::Error::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            ApiError::Common(fdw_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
            ApiError::Load(LoadError::InvalidRequest(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Load(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "LOAD_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
