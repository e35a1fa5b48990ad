//! Series Store
//!
//! Loads the canonical processed-series artifact on demand. Every call
//! re-reads the file; nothing is cached between calls, so a concurrent
//! reprocessing run may change the result of two consecutive loads.

use crate::{Error, Result, Series};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reader for the canonical artifact at a fixed path
#[derive(Debug, Clone)]
pub struct SeriesStore {
    path: PathBuf,
}

impl SeriesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the canonical artifact
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and parse the whole series
    ///
    /// Missing or unreadable files fail with [`Error::Io`]; content that is
    /// not an array of observation records fails with [`Error::Parse`].
    /// No partial series is ever returned.
    pub async fn load(&self) -> Result<Series> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let series: Series = serde_json::from_str(&content).map_err(|e| {
            Error::Parse(format!("{}: {}", self.path.display(), e))
        })?;

        debug!(
            path = %self.path.display(),
            observations = series.len(),
            "Loaded canonical series"
        );

        Ok(series)
    }
}
