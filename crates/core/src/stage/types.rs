//! Types for the stage module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One step of the fixed normalization sequence.
///
/// The declaration order is the execution order; `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Field-of-view reduction (removes neck and lower head).
    Crop,
    /// N4 bias-field correction.
    BiasCorrect,
    /// Brain extraction.
    SkullStrip,
    /// Reorientation to the standard (MNI) axes.
    Reorient,
    /// Affine registration to the reference atlas. Produces the final artifact.
    Register,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::Crop,
        Stage::BiasCorrect,
        Stage::SkullStrip,
        Stage::Reorient,
        Stage::Register,
    ];

    /// The stage whose artifact marks a scan as complete.
    pub const FINAL: Stage = Stage::Register;

    /// Suffix appended to the scan's base name for this stage's artifact.
    ///
    /// These strings are part of the on-disk contract: resumption recognizes
    /// completed scans by path alone, so they must never change.
    pub fn suffix(&self) -> &'static str {
        match self {
            Stage::Crop => "cropped",
            Stage::BiasCorrect => "n4bias",
            Stage::SkullStrip => "stripped",
            Stage::Reorient => "reoriented",
            Stage::Register => "registered",
        }
    }

    /// Short name used in logs, metrics labels and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Crop => "crop",
            Stage::BiasCorrect => "bias_correct",
            Stage::SkullStrip => "skull_strip",
            Stage::Reorient => "reorient",
            Stage::Register => "register",
        }
    }

    pub fn is_final(&self) -> bool {
        *self == Self::FINAL
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single stage invocation for one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageJob {
    /// Identity of the scan, used in errors and logs (`subject/base_name`).
    pub scan_id: String,
    /// Which transformation to run.
    pub stage: Stage,
    /// Artifact consumed by this stage.
    pub input_path: PathBuf,
    /// Artifact this stage must produce.
    pub output_path: PathBuf,
}

/// Outcome of a successful stage invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub output_path: PathBuf,
    pub output_size_bytes: u64,
    pub duration_ms: u64,
}
