//! Configuration for the pipeline module.

use serde::{Deserialize, Serialize};

/// Configuration for scan processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum scans processed concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Remove the four intermediate artifacts after a scan completes.
    #[serde(default)]
    pub delete_intermediates: bool,

    /// Per-stage timeout in seconds.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,

    /// Capacity of the report channel between workers and the collector.
    #[serde(default = "default_report_buffer")]
    pub report_buffer: usize,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_stage_timeout() -> u64 {
    7200 // 2 hours
}

fn default_report_buffer() -> usize {
    256
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            delete_intermediates: false,
            stage_timeout_secs: default_stage_timeout(),
            report_buffer: default_report_buffer(),
        }
    }
}
