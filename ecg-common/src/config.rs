//! Configuration loading and resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority, applied by the binary)
//! 2. Environment variable (applied by the binary)
//! 3. TOML config file
//! 4. Compiled defaults (fallback)
//!
//! A missing TOML file is not an error: the service logs a warning and starts
//! with defaults. A TOML file that exists but does not parse is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "ECG_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Canonical processed-series artifact read by the Series Store
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    /// Directory holding the most recently uploaded raw file
    #[serde(default = "default_intake_dir")]
    pub intake_dir: PathBuf,

    /// Streaming cadence in milliseconds (one sample per tick)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Largest accepted upload request body, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Optional directory of front-end assets served as router fallback
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    #[serde(default)]
    pub transformer: TransformerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// External transformer invocation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerConfig {
    /// Program to execute
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments passed to the program
    #[serde(default = "default_program_args")]
    pub args: Vec<String>,

    /// Working directory for the child process (inherits ours when unset)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Kill the child after this many seconds (no limit when unset)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Treat any stderr output as failure even on a zero exit code
    #[serde(default = "default_true")]
    pub fail_on_stderr: bool,

    /// Serialize upload/reprocess runs so they never interleave
    #[serde(default = "default_true")]
    pub single_flight: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("output").join("fhir_observations.json")
}

fn default_intake_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_max_upload_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_program() -> String {
    "python3".to_string()
}

fn default_program_args() -> Vec<String> {
    vec!["scripts/process_ecg.py".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            artifact_path: default_artifact_path(),
            intake_dir: default_intake_dir(),
            tick_interval_ms: default_tick_interval_ms(),
            max_upload_bytes: default_max_upload_bytes(),
            static_dir: None,
            transformer: TransformerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_program_args(),
            working_dir: None,
            timeout_secs: None,
            fail_on_stderr: true,
            single_flight: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TomlConfig {
    /// Streaming cadence as a Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(Error::Config(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config(
                "max_upload_bytes must be greater than zero".to_string(),
            ));
        }
        if self.transformer.program.trim().is_empty() {
            return Err(Error::Config(
                "transformer.program must not be empty".to_string(),
            ));
        }
        if self.transformer.timeout_secs == Some(0) {
            return Err(Error::Config(
                "transformer.timeout_secs must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read and parse a TOML config file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Platform default config file location
///
/// `<config_dir>/ecg-replay/config.toml` (e.g. `~/.config/ecg-replay/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ecg-replay").join("config.toml"))
}

/// Resolve which config file to read
///
/// Explicit path → `ECG_CONFIG` → platform default. Returns `None` when no
/// candidate is known.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path()
}

/// Load configuration with graceful degradation
///
/// A missing file yields compiled defaults plus a warning; a present but
/// malformed or invalid file is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let config = match resolve_config_path(explicit) {
        Some(path) if path.exists() => {
            let config = read_toml_config(&path)?;
            info!("Loaded configuration from {}", path.display());
            config
        }
        Some(path) => {
            warn!(
                "Config file not found at {}, using compiled defaults",
                path.display()
            );
            TomlConfig::default()
        }
        None => {
            warn!("Could not determine config directory, using compiled defaults");
            TomlConfig::default()
        }
    };

    config.validate()?;
    Ok(config)
}
