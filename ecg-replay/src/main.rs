//! ecg-replay - Observation Replay & Intake service
//!
//! Serves the processed ECG series over HTTP (bulk) and WebSocket
//! (simulated real-time replay), and accepts raw uploads that trigger the
//! external transformer.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ecg_common::config::load_config;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use ecg_replay::{build_router, AppState};

/// Command-line arguments for ecg-replay
///
/// Each flag overrides the TOML config file; each also reads an environment
/// variable.
#[derive(Parser, Debug)]
#[command(name = "ecg-replay")]
#[command(about = "ECG observation replay and intake service")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "ECG_CONFIG")]
    config: Option<PathBuf>,

    /// Interface to bind
    #[arg(long, env = "ECG_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Canonical processed-series artifact
    #[arg(long, env = "ECG_ARTIFACT_PATH")]
    artifact: Option<PathBuf>,

    /// Intake directory for uploaded raw files
    #[arg(long, env = "ECG_INTAKE_DIR")]
    intake_dir: Option<PathBuf>,

    /// Streaming cadence in milliseconds
    #[arg(long, env = "ECG_TICK_INTERVAL_MS")]
    tick_ms: Option<u64>,

    /// External transformer program
    #[arg(long, env = "ECG_TRANSFORMER")]
    transformer: Option<String>,

    /// Front-end asset directory
    #[arg(long, env = "ECG_STATIC_DIR")]
    static_dir: Option<PathBuf>,
}

/// Level used until the config file has been read
const DEFAULT_LOG_LEVEL: &str = "info";

fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!(
        "ecg_replay={0},ecg_common={0},tower_http=info",
        level
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing before config loading; RUST_LOG wins over the
    // configured level, which is applied later through the reload handle
    let env_filter = EnvFilter::try_from_default_env().ok();
    let filter_from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| log_filter(DEFAULT_LOG_LEVEL)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(path) = args.config.as_deref().filter(|path| !path.exists()) {
        warn!(
            "Config file given on the command line does not exist: {}",
            path.display()
        );
    }

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(artifact) = args.artifact {
        config.artifact_path = artifact;
    }
    if let Some(intake_dir) = args.intake_dir {
        config.intake_dir = intake_dir;
    }
    if let Some(tick_ms) = args.tick_ms {
        config.tick_interval_ms = tick_ms;
    }
    if let Some(program) = args.transformer {
        config.transformer.program = program;
    }
    if let Some(static_dir) = args.static_dir {
        config.static_dir = Some(static_dir);
    }
    config.validate().context("Invalid configuration")?;

    if !filter_from_env && config.logging.level != DEFAULT_LOG_LEVEL {
        if let Err(e) = filter_handle.reload(log_filter(&config.logging.level)) {
            warn!("Failed to apply configured log level: {}", e);
        }
    }

    info!(
        "Starting ECG replay service (ecg-replay) v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Canonical artifact: {}", config.artifact_path.display());
    info!("Intake directory: {}", config.intake_dir.display());
    info!(
        "Transformer: {} {}",
        config.transformer.program,
        config.transformer.args.join(" ")
    );
    info!("Streaming cadence: {} ms", config.tick_interval_ms);

    let state = AppState::new(&config);
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("ecg-replay stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
