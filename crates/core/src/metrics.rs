//! Prometheus metrics for the preprocessing pipeline.
//!
//! This module provides metrics for:
//! - Scans (completed, resumed, failed)
//! - Stage invocations (counts and durations per stage)
//! - Worker pool occupancy

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Registry holding every pipeline metric.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for metric in all_metrics() {
        if let Err(e) = registry.register(metric) {
            tracing::warn!("Failed to register metric: {}", e);
        }
    }
    registry
});

// =============================================================================
// Scan Metrics
// =============================================================================

/// Scans processed by result.
pub static SCANS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("neuroprep_scans_total", "Total scans processed"),
        &["result"], // "completed", "resumed", "failed"
    )
    .unwrap()
});

/// Wall-clock time of one scan's stage sequence.
pub static SCAN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "neuroprep_scan_duration_seconds",
            "Duration of a full scan pipeline run",
        )
        .buckets(vec![
            10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0,
        ]),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Stage Metrics
// =============================================================================

/// Stage invocations by stage and result.
pub static STAGE_INVOCATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "neuroprep_stage_invocations_total",
            "Total external stage invocations",
        ),
        &["stage", "result"], // result: "success", "failed"
    )
    .unwrap()
});

/// Stage invocation duration.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "neuroprep_stage_duration_seconds",
            "Duration of external stage invocations",
        )
        .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        &["stage"],
    )
    .unwrap()
});

// =============================================================================
// Worker Pool Metrics
// =============================================================================

/// Workers currently running a scan.
pub static WORKERS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "neuroprep_workers_active",
        "Number of workers currently running a scan",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SCANS_TOTAL.clone()),
        Box::new(SCAN_DURATION.clone()),
        Box::new(STAGE_INVOCATIONS.clone()),
        Box::new(STAGE_DURATION.clone()),
        Box::new(WORKERS_ACTIVE.clone()),
    ]
}

/// Renders every registered metric in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_metrics() {
        STAGE_INVOCATIONS
            .with_label_values(&["crop", "success"])
            .inc();
        SCANS_TOTAL.with_label_values(&["completed"]).inc();

        let text = render();
        assert!(text.contains("neuroprep_stage_invocations_total"));
        assert!(text.contains("neuroprep_scans_total"));
    }
}
