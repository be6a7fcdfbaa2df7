//! Mock stage runner for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::stage::{Stage, StageError, StageFailure, StageJob, StageReport, StageRunner};

/// A recorded stage invocation for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedStage {
    /// The job that was submitted.
    pub job: StageJob,
    pub started_at: Instant,
    pub finished_at: Instant,
    /// Whether the invocation succeeded.
    pub success: bool,
}

/// Mock implementation of the StageRunner trait.
///
/// Provides controllable behavior for testing:
/// - Track stage jobs for assertions
/// - Write a small output file per stage so later stages find their input
/// - Fail or panic on a given `(scan, stage)` pair
/// - Simulate stage duration and measure peak concurrency
///
/// # Example
///
/// ```rust,ignore
/// use neuroprep_core::testing::MockStageRunner;
///
/// let runner = MockStageRunner::new();
/// runner.fail_on("s1/I1", Stage::SkullStrip).await;
///
/// let pipeline = ScanPipeline::new(Arc::new(runner), namer);
/// ```
#[derive(Debug, Default)]
pub struct MockStageRunner {
    /// Recorded invocations.
    invocations: Arc<RwLock<Vec<RecordedStage>>>,
    /// Injected failures by `(scan_id, stage)`.
    failures: Arc<RwLock<HashSet<(String, Stage)>>>,
    /// Injected panics by `(scan_id, stage)`.
    panics: Arc<RwLock<HashSet<(String, Stage)>>>,
    /// Write a truncated output before failing.
    partial_output_on_failure: AtomicBool,
    /// Simulated stage duration in milliseconds.
    delay_ms: AtomicU64,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockStageRunner {
    /// Create a new mock runner that succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded invocations in start order.
    pub async fn recorded(&self) -> Vec<RecordedStage> {
        self.invocations.read().await.clone()
    }

    /// Get the number of stage invocations performed.
    pub async fn invocation_count(&self) -> usize {
        self.invocations.read().await.len()
    }

    /// Jobs submitted for one scan, in invocation order.
    pub async fn jobs_for(&self, scan_id: &str) -> Vec<StageJob> {
        self.invocations
            .read()
            .await
            .iter()
            .filter(|r| r.job.scan_id == scan_id)
            .map(|r| r.job.clone())
            .collect()
    }

    /// Clear recorded invocations and the concurrency peak.
    pub async fn clear_recorded(&self) {
        self.invocations.write().await.clear();
        self.peak.store(0, Ordering::SeqCst);
    }

    /// Make `stage` fail for the scan with the given id.
    pub async fn fail_on(&self, scan_id: &str, stage: Stage) {
        self.failures
            .write()
            .await
            .insert((scan_id.to_string(), stage));
    }

    /// Make `stage` panic for the scan with the given id.
    pub async fn panic_on(&self, scan_id: &str, stage: Stage) {
        self.panics
            .write()
            .await
            .insert((scan_id.to_string(), stage));
    }

    /// Leave a truncated output file behind when an injected failure fires.
    pub fn set_partial_output_on_failure(&self, partial: bool) {
        self.partial_output_on_failure
            .store(partial, Ordering::SeqCst);
    }

    /// Set the simulated duration of each stage.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Highest number of invocations observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn record(&self, job: &StageJob, started_at: Instant, success: bool) {
        self.invocations.write().await.push(RecordedStage {
            job: job.clone(),
            started_at,
            finished_at: Instant::now(),
            success,
        });
    }
}

/// Decrements the in-flight counter even when the invocation panics.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StageRunner for MockStageRunner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(&self, job: &StageJob) -> Result<StageReport, StageError> {
        let _guard = InFlight::enter(&self.in_flight, &self.peak);
        let started_at = Instant::now();

        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let key = (job.scan_id.clone(), job.stage);
        if self.panics.read().await.contains(&key) {
            panic!("injected panic in {} for {}", job.stage, job.scan_id);
        }

        if !tokio::fs::try_exists(&job.input_path).await.unwrap_or(false) {
            self.record(job, started_at, false).await;
            return Err(StageError::new(
                job.stage,
                job.scan_id.clone(),
                StageFailure::InputNotFound {
                    path: job.input_path.clone(),
                },
            ));
        }

        if self.failures.read().await.contains(&key) {
            if self.partial_output_on_failure.load(Ordering::SeqCst) {
                let _ = tokio::fs::write(&job.output_path, b"partial").await;
            }
            self.record(job, started_at, false).await;
            return Err(StageError::new(
                job.stage,
                job.scan_id.clone(),
                StageFailure::Other(format!("injected failure in {}", job.stage)),
            ));
        }

        if let Some(parent) = job.output_path.parent() {
            if let Err(source) = tokio::fs::create_dir_all(parent).await {
                self.record(job, started_at, false).await;
                return Err(StageError::new(
                    job.stage,
                    job.scan_id.clone(),
                    StageFailure::OutputDirectory {
                        path: parent.to_path_buf(),
                        source,
                    },
                ));
            }
        }

        let content = format!("{} <- {}\n", job.stage, job.input_path.display());
        if let Err(e) = tokio::fs::write(&job.output_path, content.as_bytes()).await {
            self.record(job, started_at, false).await;
            return Err(StageError::new(
                job.stage,
                job.scan_id.clone(),
                StageFailure::Other(e.to_string()),
            ));
        }

        self.record(job, started_at, true).await;

        Ok(StageReport {
            stage: job.stage,
            output_path: job.output_path.clone(),
            output_size_bytes: content.len() as u64,
            duration_ms: started_at.elapsed().as_millis() as u64,
        })
    }

    async fn validate(&self) -> Result<(), StageError> {
        Ok(())
    }
}
