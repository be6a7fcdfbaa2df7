//! Error types for the split module.

use std::path::PathBuf;
use thiserror::Error;

/// The split plan is inconsistent. Detected before any filesystem access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitConfigError {
    #[error("split percentages must sum to 100, got {train} + {valid} + {test} = {sum}")]
    PercentagesSum {
        train: u32,
        valid: u32,
        test: u32,
        sum: u64,
    },

    #[error("label for class {class} must be 0 or 1, got {label}")]
    InvalidLabel { class: String, label: u8 },

    #[error("no classes configured")]
    NoClasses,
}

/// Manifest generation failed.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error(transparent)]
    Config(#[from] SplitConfigError),

    #[error("dataset root not found: {path}")]
    RootNotFound { path: PathBuf },

    #[error("I/O error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write manifest {path}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
