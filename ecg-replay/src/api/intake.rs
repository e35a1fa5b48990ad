//! Upload and reprocessing handlers
//!
//! POST /upload, GET /process

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult, NO_FILE_MESSAGE};
use crate::intake::PurgeFailure;
use crate::AppState;

/// Multipart field carrying the uploaded file
const FILE_FIELD: &str = "file";

/// POST /upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub purged: Vec<String>,
    pub purge_failures: Vec<PurgeFailure>,
    pub stdout: String,
    pub stderr: String,
}

/// GET /process response
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub message: String,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// POST /upload
///
/// Accepts a single multipart file field, replaces the intake directory
/// contents with it and runs the transformer.
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let mut multipart = multipart.map_err(|e| {
        warn!(error = %e, "Upload is not a multipart request");
        ApiError::BadRequest(NO_FILE_MESSAGE.to_string())
    })?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed upload: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let content = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Malformed upload: {}", e)))?;
        upload = Some((filename, content));
        break;
    }

    let (filename, content) =
        upload.ok_or_else(|| ApiError::BadRequest(NO_FILE_MESSAGE.to_string()))?;

    let report = state.intake.accept_upload(&filename, &content).await?;
    let processing = report
        .processing
        .map_err(|failure| ApiError::ExternalTool(failure.to_string()))?;

    info!(
        file = %report.filename,
        purged = report.purge.removed.len(),
        purge_failures = report.purge.failures.len(),
        "Upload processed"
    );

    Ok(Json(UploadResponse {
        message: "File uploaded and processed successfully.".to_string(),
        filename: report.filename,
        purged: report.purge.removed,
        purge_failures: report.purge.failures,
        stdout: processing.stdout,
        stderr: processing.stderr,
    }))
}

/// GET /process
///
/// Re-runs the transformer against the current intake contents.
pub async fn reprocess(State(state): State<AppState>) -> ApiResult<Json<ProcessResponse>> {
    let report = state
        .intake
        .reprocess()
        .await
        .map_err(|failure| ApiError::ExternalTool(failure.to_string()))?;

    Ok(Json(ProcessResponse {
        message: "Processing completed successfully.".to_string(),
        stdout: report.stdout,
        stderr: report.stderr,
        duration_ms: report.duration_ms,
    }))
}

/// Build intake routes
pub fn intake_routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_file))
        .route("/process", get(reprocess))
}
