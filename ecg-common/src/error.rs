//! Common error types for the ECG replay service

use thiserror::Error;

/// Common result type for ECG replay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the store, pipeline and service layers
#[derive(Error, Debug)]
pub enum Error {
    /// Artifact missing or unreadable (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Artifact content is not a well-formed observation array
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// External transformer failed to launch, exited non-zero or emitted diagnostics
    #[error("External tool error: {0}")]
    ExternalTool(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}
