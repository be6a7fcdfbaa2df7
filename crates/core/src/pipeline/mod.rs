//! Scan pipeline.
//!
//! Runs the five normalization stages for one scan, resuming at whole-scan
//! granularity: a scan whose final artifact already exists is skipped without
//! invoking any stage. Intermediates from an interrupted run are re-derived.

mod config;
mod error;
mod scan_pipeline;
mod types;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use scan_pipeline::{expected_outputs, ScanPipeline};
pub use types::{PipelineRun, RunStatus};
