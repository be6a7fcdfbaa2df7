//! Types for the coordinator module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::pipeline::{PipelineRun, RunStatus};
use crate::stage::Stage;

/// Status of the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Identifier of the current or last pool run.
    pub run_id: Option<String>,
    /// Whether the pool is dispatching scans.
    pub running: bool,
    /// Maximum scans processed concurrently.
    pub workers: usize,
    /// Scans handed to a worker.
    pub dispatched: u64,
    /// Scans currently being processed.
    pub active: u64,
    /// Scans that completed, including resumed ones.
    pub completed: u64,
    /// Scans that failed.
    pub failed: u64,
    /// Scans never dispatched because the pool was stopped.
    pub not_started: u64,
}

/// One failed scan in a run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    /// Scan identity (`subject/base_name`).
    pub scan: String,
    pub source_path: PathBuf,
    /// Stage the scan failed at, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub error: String,
}

/// Tally of a pool run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    /// Completed scans, including resumed ones.
    pub completed: usize,
    /// Scans skipped because their final artifact already existed.
    pub resumed: usize,
    pub failed: usize,
    pub not_started: usize,
    pub failures: Vec<ScanFailure>,
}

impl RunSummary {
    /// Adds one scan outcome to the tally.
    pub fn record(&mut self, run: &PipelineRun) {
        self.total += 1;
        match run.status {
            RunStatus::Completed => {
                self.completed += 1;
                if run.resumed {
                    self.resumed += 1;
                }
            }
            RunStatus::Failed => {
                self.failed += 1;
                self.failures.push(ScanFailure {
                    scan: run.scan.id(),
                    source_path: run.scan.source_path().to_path_buf(),
                    stage: run.failed_stage(),
                    error: run
                        .error
                        .as_ref()
                        .map(|e| error_chain(e))
                        .unwrap_or_else(|| "unknown error".to_string()),
                });
            }
            RunStatus::NotStarted | RunStatus::InProgress => {
                self.not_started += 1;
            }
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Formats an error with its sources, `outer: inner: ...`.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
