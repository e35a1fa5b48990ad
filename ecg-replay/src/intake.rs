//! Intake Orchestrator
//!
//! Accepts an uploaded raw file, purges every other entry from the intake
//! directory and runs the external transformer that regenerates the
//! canonical artifact.
//!
//! An upload is a two-phase operation with no rollback: once the file is
//! stored and stale entries are purged, a transformer failure is reported
//! alongside the purge summary but does not restore anything. Individual
//! purge failures are warnings, never fatal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ecg_common::config::TransformerConfig;
use ecg_common::{Error, Result};
use serde::Serialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Environment variable naming the intake directory, set for the child
pub const INTAKE_DIR_ENV: &str = "ECG_INTAKE_DIR";

/// Environment variable naming the canonical artifact, set for the child
pub const ARTIFACT_PATH_ENV: &str = "ECG_ARTIFACT_PATH";

/// External transformer failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolFailure {
    /// Program could not be started
    #[error("Failed to launch transformer '{program}': {reason}")]
    Launch { program: String, reason: String },

    /// Program exited unsuccessfully
    #[error("Transformer exited with status {}: {}", describe_exit(.code), .stderr.trim())]
    Exit {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// Program exited successfully but wrote to stderr
    #[error("Transformer reported errors: {}", .stderr.trim())]
    Diagnostics { stdout: String, stderr: String },

    /// Program exceeded the configured time limit and was killed
    #[error("Transformer timed out after {secs}s")]
    Timeout { secs: u64 },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

impl From<ToolFailure> for Error {
    fn from(failure: ToolFailure) -> Self {
        Error::ExternalTool(failure.to_string())
    }
}

/// Successful transformer run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessReport {
    pub exit_code: Option<i32>,
    pub stdout: String,
    /// Diagnostics tolerated when `fail_on_stderr` is off
    pub stderr: String,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

/// A stale intake entry that could not be removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeFailure {
    pub name: String,
    pub error: String,
}

/// Result of purging the intake directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub removed: Vec<String>,
    pub failures: Vec<PurgeFailure>,
}

impl PurgeSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Composite result of an accepted upload
#[derive(Debug, Clone)]
pub struct UploadReport {
    /// Sanitized name the file was stored under
    pub filename: String,
    pub stored: PathBuf,
    pub purge: PurgeSummary,
    pub processing: std::result::Result<ProcessReport, ToolFailure>,
}

/// Deletes one stale intake entry during a purge
#[async_trait]
pub trait EntryRemover: Send + Sync {
    async fn remove(&self, path: &Path, is_dir: bool) -> std::io::Result<()>;
}

/// Filesystem removal: `remove_dir_all` for directories, `remove_file` otherwise
pub struct FsRemover;

#[async_trait]
impl EntryRemover for FsRemover {
    async fn remove(&self, path: &Path, is_dir: bool) -> std::io::Result<()> {
        if is_dir {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        }
    }
}

/// Orchestrates uploads and transformer runs over the intake directory
pub struct IntakeOrchestrator {
    intake_dir: PathBuf,
    artifact_path: PathBuf,
    transformer: TransformerConfig,
    /// Present when runs are serialized (single-flight)
    flight: Option<Mutex<()>>,
    remover: Arc<dyn EntryRemover>,
}

impl IntakeOrchestrator {
    pub fn new(
        intake_dir: impl Into<PathBuf>,
        artifact_path: impl Into<PathBuf>,
        transformer: TransformerConfig,
    ) -> Self {
        let flight = transformer.single_flight.then(|| Mutex::new(()));
        Self {
            intake_dir: intake_dir.into(),
            artifact_path: artifact_path.into(),
            transformer,
            flight,
            remover: Arc::new(FsRemover),
        }
    }

    /// Replace how stale entries are deleted during a purge
    pub fn with_remover(mut self, remover: Arc<dyn EntryRemover>) -> Self {
        self.remover = remover;
        self
    }

    pub fn intake_dir(&self) -> &Path {
        &self.intake_dir
    }

    /// Store an upload, purge stale entries and run the transformer
    ///
    /// Fails only when the file cannot be stored or the intake directory
    /// cannot be listed. Transformer failures are reported in
    /// [`UploadReport::processing`].
    pub async fn accept_upload(&self, filename: &str, content: &[u8]) -> Result<UploadReport> {
        let name = sanitize_filename(filename)?;
        let _flight = self.enter_flight().await;

        tokio::fs::create_dir_all(&self.intake_dir).await?;
        let stored = self.intake_dir.join(&name);
        tokio::fs::write(&stored, content).await?;
        info!(
            file = %stored.display(),
            bytes = content.len(),
            "Stored uploaded intake file"
        );

        let purge = self.purge_except(&name).await?;
        if !purge.is_clean() {
            warn!(
                failures = purge.failures.len(),
                "Intake directory still holds stale files after purge"
            );
        }

        let processing = self.run_transformer().await;

        Ok(UploadReport {
            filename: name,
            stored,
            purge,
            processing,
        })
    }

    /// Re-run the transformer against the current intake contents
    pub async fn reprocess(&self) -> std::result::Result<ProcessReport, ToolFailure> {
        let _flight = self.enter_flight().await;
        self.run_transformer().await
    }

    async fn enter_flight(&self) -> Option<MutexGuard<'_, ()>> {
        match &self.flight {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }

    /// Delete every intake entry except `keep`
    async fn purge_except(&self, keep: &str) -> Result<PurgeSummary> {
        let mut summary = PurgeSummary::default();
        let mut entries = tokio::fs::read_dir(&self.intake_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            if file_name == OsStr::new(keep) {
                continue;
            }

            let name = file_name.to_string_lossy().into_owned();
            let path = entry.path();
            let removal = match entry.file_type().await {
                Ok(kind) => self.remover.remove(&path, kind.is_dir()).await,
                Err(e) => Err(e),
            };

            match removal {
                Ok(()) => {
                    debug!(file = %name, "Removed stale intake entry");
                    summary.removed.push(name);
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "Failed to remove stale intake entry");
                    summary.failures.push(PurgeFailure {
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(summary)
    }

    async fn run_transformer(&self) -> std::result::Result<ProcessReport, ToolFailure> {
        let program = &self.transformer.program;
        let mut command = Command::new(program);
        command
            .args(&self.transformer.args)
            .env(INTAKE_DIR_ENV, &self.intake_dir)
            .env(ARTIFACT_PATH_ENV, &self.artifact_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.transformer.working_dir {
            command.current_dir(dir);
        }

        info!(
            program = %program,
            args = ?self.transformer.args,
            "Invoking external transformer"
        );
        let started = Instant::now();

        let output = match self.transformer.timeout_secs {
            Some(secs) => {
                match tokio::time::timeout(Duration::from_secs(secs), command.output()).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(program = %program, secs, "Transformer timed out, child killed");
                        return Err(ToolFailure::Timeout { secs });
                    }
                }
            }
            None => command.output().await,
        };

        let output = output.map_err(|e| {
            warn!(program = %program, error = %e, "Failed to launch transformer");
            ToolFailure::Launch {
                program: program.clone(),
                reason: e.to_string(),
            }
        })?;

        let duration_ms = started.elapsed().as_millis() as u64;
        let result = classify_output(
            output.status.success(),
            output.status.code(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
            self.transformer.fail_on_stderr,
            duration_ms,
        );

        match &result {
            Ok(report) => {
                if !report.stderr.trim().is_empty() {
                    warn!(stderr = %report.stderr.trim(), "Transformer succeeded with diagnostics");
                }
                info!(duration_ms, "Transformer completed; canonical artifact refreshed");
            }
            Err(failure) => warn!(error = %failure, duration_ms, "Transformer failed"),
        }

        result
    }
}

/// Decide whether a finished transformer run counts as success
///
/// With `fail_on_stderr`, any stderr output fails the run even when the
/// exit code is zero.
pub fn classify_output(
    success: bool,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
    fail_on_stderr: bool,
    duration_ms: u64,
) -> std::result::Result<ProcessReport, ToolFailure> {
    if !success {
        return Err(ToolFailure::Exit {
            code: exit_code,
            stdout,
            stderr,
        });
    }

    if fail_on_stderr && !stderr.trim().is_empty() {
        return Err(ToolFailure::Diagnostics { stdout, stderr });
    }

    Ok(ProcessReport {
        exit_code,
        stdout,
        stderr,
        duration_ms,
        completed_at: Utc::now(),
    })
}

/// Reduce a client-supplied filename to a bare file name
///
/// Directory components (either separator) are stripped; names that are
/// empty or refer to a directory are rejected.
pub fn sanitize_filename(raw: &str) -> Result<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("");
    if base.is_empty() || base == "." || base == ".." {
        return Err(Error::InvalidInput(format!(
            "Invalid upload filename: {:?}",
            raw
        )));
    }
    Ok(base.to_string())
}
