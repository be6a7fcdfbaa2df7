//! Types for the pipeline module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::discovery::Scan;
use crate::stage::Stage;

use super::error::PipelineError;

/// Lifecycle state of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::NotStarted => "not_started",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Execution record of one scan.
#[derive(Debug)]
pub struct PipelineRun {
    pub scan: Scan,
    pub status: RunStatus,
    /// Completed because the final artifact already existed.
    pub resumed: bool,
    /// Stages actually invoked, in order. Includes the failing stage.
    pub stages_run: Vec<Stage>,
    /// From the first stage invocation to the end of cleanup or the abort point.
    pub duration: Duration,
    pub final_artifact: PathBuf,
    pub error: Option<PipelineError>,
}

impl PipelineRun {
    pub fn new(scan: Scan, final_artifact: PathBuf) -> Self {
        Self {
            scan,
            status: RunStatus::NotStarted,
            resumed: false,
            stages_run: Vec::new(),
            duration: Duration::ZERO,
            final_artifact,
            error: None,
        }
    }

    /// Record for a scan whose worker died before producing a result.
    pub fn crashed(scan: Scan, final_artifact: PathBuf, reason: impl Into<String>) -> Self {
        let error = PipelineError::WorkerCrashed {
            scan: scan.id(),
            reason: reason.into(),
        };
        let mut run = Self::new(scan, final_artifact);
        run.status = RunStatus::Failed;
        run.error = Some(error);
        run
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }

    /// Stage the scan failed at, if any.
    pub fn failed_stage(&self) -> Option<Stage> {
        self.error.as_ref().and_then(|e| e.stage())
    }
}
