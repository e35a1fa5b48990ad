//! Error types for ecg-replay
//!
//! Every handler-level failure renders as a machine-readable
//! `{"error": <message>}` body with a matching status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Client-facing message when the canonical series cannot be loaded
pub const SERIES_UNAVAILABLE_MESSAGE: &str = "Unable to read ECG data.";

/// Client-facing message when an upload carries no file
pub const NO_FILE_MESSAGE: &str = "No file uploaded.";

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("{0}")]
    BadRequest(String),

    /// Canonical artifact missing, unreadable or malformed (500)
    #[error("Unable to read ECG data: {0}")]
    SeriesUnavailable(#[source] ecg_common::Error),

    /// External transformer failed (500)
    #[error("{0}")]
    ExternalTool(String),

    /// Internal server error (500)
    #[error("{0}")]
    Internal(String),

    /// ecg-common error
    #[error(transparent)]
    Common(#[from] ecg_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::SeriesUnavailable(ref err) => {
                error!(error = %err, "Canonical series unavailable");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    SERIES_UNAVAILABLE_MESSAGE.to_string(),
                )
            }
            ApiError::ExternalTool(msg) => {
                error!(error = %msg, "External transformer failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ApiError::Common(ecg_common::Error::InvalidInput(msg)) => {
                warn!(error = %msg, "Rejected invalid input");
                (StatusCode::BAD_REQUEST, msg)
            }
            ApiError::Common(err) => {
                error!(error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
