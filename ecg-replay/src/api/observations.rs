//! Bulk observation query and streaming upgrade routes

use axum::{extract::State, routing::get, Json, Router};
use ecg_common::{transform, TransformedSample};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/observations (also /observations)
///
/// Full transformed sequence as an ordered list of
/// `{time, value, seconds}` records.
pub async fn get_observations(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<TransformedSample>>> {
    let series = state.store.load().await.map_err(ApiError::SeriesUnavailable)?;
    let samples = transform(&series);

    debug!(
        observations = series.len(),
        samples = samples.len(),
        "Serving bulk observation query"
    );

    Ok(Json(samples))
}

/// Build observation routes
pub fn observation_routes() -> Router<AppState> {
    Router::new()
        .route("/api/observations", get(get_observations))
        .route("/observations", get(get_observations))
        .route("/stream", get(super::stream::stream_observations))
}
