//! Error types for the pipeline module.

use std::path::PathBuf;
use thiserror::Error;

use crate::stage::{Stage, StageError};

/// Why a scan did not complete.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage invocation failed; the remaining stages were skipped.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// The subject's output directory could not be created.
    #[error("failed to create workspace {path}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The staged final artifact could not be moved into place.
    #[error("failed to finalize {path}")]
    Finalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The worker task running the scan panicked or was aborted.
    #[error("worker crashed while processing {scan}: {reason}")]
    WorkerCrashed { scan: String, reason: String },
}

impl PipelineError {
    /// The stage that failed, when the failure came from a stage.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage(e) => Some(e.stage),
            PipelineError::Finalize { .. } => Some(Stage::FINAL),
            _ => None,
        }
    }
}
