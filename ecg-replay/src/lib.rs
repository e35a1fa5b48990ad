//! ecg-replay library - Observation Replay & Intake service
//!
//! Exposes the processed ECG series as a bulk query and as a per-client
//! simulated real-time WebSocket replay, and accepts raw uploads that
//! trigger the external transformer.

pub mod analysis;
pub mod api;
pub mod error;
pub mod intake;
pub mod session;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use ecg_common::config::TomlConfig;
use ecg_common::SeriesStore;
use intake::IntakeOrchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Reader for the canonical artifact
    pub store: SeriesStore,
    /// Upload and reprocessing orchestration
    pub intake: Arc<IntakeOrchestrator>,
    /// Streaming cadence
    pub tick_interval: Duration,
    /// Upload request body limit
    pub max_upload_bytes: usize,
    /// Front-end assets served as fallback
    pub static_dir: Option<PathBuf>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: &TomlConfig) -> Self {
        Self {
            store: SeriesStore::new(config.artifact_path.clone()),
            intake: Arc::new(IntakeOrchestrator::new(
                config.intake_dir.clone(),
                config.artifact_path.clone(),
                config.transformer.clone(),
            )),
            tick_interval: config.tick_interval(),
            max_upload_bytes: config.max_upload_bytes,
            static_dir: config.static_dir.clone(),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;
    let static_dir = state.static_dir.clone();

    let router = Router::new()
        .merge(api::observation_routes())
        .merge(api::intake_routes())
        .merge(api::heart_rate_routes())
        .merge(api::health_routes());

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
