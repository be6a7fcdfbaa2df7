//! Error types for the discovery module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort scan discovery. All of them are fatal for a run.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Source root does not exist.
    #[error("source root not found: {path}")]
    RootNotFound { path: PathBuf },

    /// Source root exists but is not a directory.
    #[error("source root is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// An entry below the root could not be read.
    #[error("failed to read {path}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scan files were found at an unexpected depth.
    #[error(
        "malformed layout: {} scan file(s) not at depth {expected_depth}, first: {}",
        offenders.len(),
        offenders.first().map(|p| p.display().to_string()).unwrap_or_default()
    )]
    MalformedLayout {
        expected_depth: usize,
        offenders: Vec<PathBuf>,
    },

    /// Two scans would write to the same artifact namespace.
    #[error("duplicate scan {subject_id}/{base_name}: {} and {}", first.display(), second.display())]
    DuplicateScan {
        subject_id: String,
        base_name: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// The scan file name pattern is not a valid regex.
    #[error("invalid scan pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
