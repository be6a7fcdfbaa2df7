use tokio::sync::mpsc;

use crate::pipeline::{PipelineRun, RunStatus};

use super::types::RunSummary;

/// Background task that receives scan outcomes and tallies them.
pub struct ReportCollector {
    rx: mpsc::Receiver<PipelineRun>,
}

impl ReportCollector {
    /// Create a new report collector
    pub fn new(rx: mpsc::Receiver<PipelineRun>) -> Self {
        Self { rx }
    }

    /// Run the collector, consuming reports until every sender is dropped
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) -> RunSummary {
        let mut summary = RunSummary::default();

        while let Some(run) = self.rx.recv().await {
            log_outcome(&run);
            summary.record(&run);
        }

        tracing::info!(
            total = summary.total,
            completed = summary.completed,
            resumed = summary.resumed,
            failed = summary.failed,
            not_started = summary.not_started,
            "Run finished"
        );

        summary
    }
}

fn log_outcome(run: &PipelineRun) {
    let scan = &run.scan;
    match run.status {
        RunStatus::Completed if run.resumed => {
            tracing::info!(scan = %scan, "Already complete");
        }
        RunStatus::Completed => {
            tracing::info!(
                scan = %scan,
                duration_ms = run.duration.as_millis() as u64,
                "Completed {}",
                run.final_artifact.display()
            );
        }
        RunStatus::Failed => {
            let stage = run
                .failed_stage()
                .map(|s| s.as_str())
                .unwrap_or("none");
            match &run.error {
                Some(e) => tracing::error!(scan = %scan, stage, "Scan failed: {}", e),
                None => tracing::error!(scan = %scan, stage, "Scan failed"),
            }
        }
        RunStatus::NotStarted | RunStatus::InProgress => {
            tracing::warn!(scan = %scan, "Not started");
        }
    }
}

/// Create a report channel
///
/// Returns:
/// - `mpsc::Sender<PipelineRun>` - hand this to `WorkerPool::run`
/// - `ReportCollector` - spawn this as a background task with `tokio::spawn(collector.run())`
pub fn create_report_channel(buffer_size: usize) -> (mpsc::Sender<PipelineRun>, ReportCollector) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (tx, ReportCollector::new(rx))
}
