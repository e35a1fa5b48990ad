//! Heart-rate analysis endpoint

use axum::{extract::rejection::JsonRejection, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::analysis::{analyze_heart_rate, valid_heart_rates, HeartRateAnalysis};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const MALFORMED_PAYLOAD_MESSAGE: &str = "Malformed heart rate payload";

/// POST /api/heart-data request
#[derive(Debug, Deserialize)]
pub struct HeartDataRequest {
    #[serde(default)]
    pub heart_rate: Vec<f64>,
}

/// POST /api/heart-data response
#[derive(Debug, Serialize)]
pub struct HeartDataResponse {
    pub analysis: HeartRateAnalysis,
}

/// POST /api/heart-data
///
/// Averages the plausible readings and classifies the result. A body that
/// is not JSON of the expected shape is rejected as malformed; a missing
/// body counts as no data.
pub async fn analyze_heart_data(
    request: Result<Json<HeartDataRequest>, JsonRejection>,
) -> ApiResult<Json<HeartDataResponse>> {
    let heart_rate = match request {
        Ok(Json(body)) => body.heart_rate,
        Err(JsonRejection::JsonDataError(_) | JsonRejection::JsonSyntaxError(_)) => {
            return Err(ApiError::BadRequest(MALFORMED_PAYLOAD_MESSAGE.to_string()));
        }
        Err(_) => Vec::new(),
    };
    if heart_rate.is_empty() {
        return Err(ApiError::BadRequest("No heart rate data provided".to_string()));
    }

    let valid = valid_heart_rates(&heart_rate);
    let analysis = analyze_heart_rate(&valid)
        .ok_or_else(|| ApiError::BadRequest("No valid heart rate data found".to_string()))?;

    Ok(Json(HeartDataResponse { analysis }))
}

/// Build heart-rate analysis routes
pub fn heart_rate_routes() -> Router<AppState> {
    Router::new().route("/api/heart-data", post(analyze_heart_data))
}
