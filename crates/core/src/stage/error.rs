//! Error types for the stage module.

use std::path::PathBuf;
use thiserror::Error;

use super::types::Stage;

/// A single external stage invocation failed.
#[derive(Debug, Error)]
#[error("stage {stage} failed for scan {scan}: {cause}")]
pub struct StageError {
    /// Stage that failed.
    pub stage: Stage,
    /// Scan identity (`subject/base_name`), or the tool name for validation errors.
    pub scan: String,
    /// Underlying reason.
    #[source]
    pub cause: StageFailure,
}

/// Why a stage invocation failed.
#[derive(Debug, Error)]
pub enum StageFailure {
    /// Executable not found.
    #[error("executable not found: {path}")]
    ToolNotFound { path: PathBuf },

    /// Reference atlas missing.
    #[error("reference volume not found: {path}")]
    ReferenceNotFound { path: PathBuf },

    /// Input artifact missing.
    #[error("input not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Could not create the output directory.
    #[error("failed to create output directory: {path}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Process could not be started or awaited.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Process exited unsuccessfully.
    #[error("{program} exited with {}", exit_description(.code))]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: Option<String>,
    },

    /// Process exceeded the configured timeout and was killed.
    #[error("timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Process reported success but did not write its output.
    #[error("output not created: {path}")]
    MissingOutput { path: PathBuf },

    /// Failure injected or produced by a non-process runner.
    #[error("{0}")]
    Other(String),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "signal".to_string(),
    }
}

impl StageError {
    /// Creates a stage error.
    pub fn new(stage: Stage, scan: impl Into<String>, cause: StageFailure) -> Self {
        Self {
            stage,
            scan: scan.into(),
            cause,
        }
    }

    /// Captured stderr of the failed process, if any.
    pub fn stderr(&self) -> Option<&str> {
        match &self.cause {
            StageFailure::NonZeroExit { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }
}
