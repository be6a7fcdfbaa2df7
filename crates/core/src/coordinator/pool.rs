//! Bounded worker pool over scan pipelines.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;
use uuid::Uuid;

use crate::discovery::Scan;
use crate::metrics;
use crate::pipeline::{PipelineRun, RunStatus, ScanPipeline};
use crate::stage::StageRunner;

use super::types::PoolStatus;

/// Tracks statistics for the worker pool.
#[derive(Default)]
struct PoolStats {
    dispatched: AtomicU64,
    active: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    not_started: AtomicU64,
}

impl PoolStats {
    fn reset(&self) {
        self.dispatched.store(0, Ordering::Relaxed);
        self.active.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.not_started.store(0, Ordering::Relaxed);
    }

    fn to_status(&self, run_id: Option<String>, running: bool, workers: usize) -> PoolStatus {
        PoolStatus {
            run_id,
            running,
            workers,
            dispatched: self.dispatched.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            not_started: self.not_started.load(Ordering::Relaxed),
        }
    }
}

/// Runs scan pipelines with at most `workers` scans in flight.
///
/// Each dispatched scan runs in its own task; the pipeline itself runs in a
/// nested task so that a panic is reported as a failed scan instead of
/// taking the pool down. Completion order is not guaranteed.
pub struct WorkerPool<R: StageRunner> {
    pipeline: ScanPipeline<R>,
    workers: usize,
    semaphore: Arc<Semaphore>,
    stats: Arc<PoolStats>,
    running: Arc<RwLock<bool>>,
    stop_requested: Arc<AtomicBool>,
    run_id: Arc<RwLock<Option<String>>>,
}

impl<R: StageRunner + 'static> WorkerPool<R> {
    /// Creates a pool. `workers` is clamped to at least one.
    pub fn new(pipeline: ScanPipeline<R>, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            pipeline,
            workers,
            semaphore: Arc::new(Semaphore::new(workers)),
            stats: Arc::new(PoolStats::default()),
            running: Arc::new(RwLock::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            run_id: Arc::new(RwLock::new(None)),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn pipeline(&self) -> &ScanPipeline<R> {
        &self.pipeline
    }

    /// Stops dispatching queued scans.
    ///
    /// Scans already handed to a worker run to completion. A stop requested
    /// before [`run`](Self::run) starts is kept: that run dispatches nothing.
    /// A stopped pool stays stopped.
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        self.stop_requested.store(true, Ordering::SeqCst);
        if *running {
            tracing::info!("Stopping worker pool, no further scans will be dispatched");
        }
        *running = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Returns the current pool status.
    pub async fn status(&self) -> PoolStatus {
        let running = *self.running.read().await;
        let run_id = self.run_id.read().await.clone();
        self.stats.to_status(run_id, running, self.workers)
    }

    /// Processes every scan and sends one report per scan on `reports`.
    ///
    /// Blocks only while waiting for a free worker slot and, at the end, for
    /// dispatched scans to finish. Scans left undispatched by [`stop`](Self::stop)
    /// are reported as `NotStarted`.
    pub async fn run(&self, scans: Vec<Scan>, reports: mpsc::Sender<PipelineRun>) -> PoolStatus {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("pool_run", run_id = %run_id);

        self.stats.reset();
        *self.run_id.write().await = Some(run_id);
        {
            let mut running = self.running.write().await;
            *running = !self.stop_requested.load(Ordering::SeqCst);
        }

        self.dispatch_all(scans, reports).instrument(span).await;

        *self.running.write().await = false;
        self.status().await
    }

    async fn dispatch_all(&self, scans: Vec<Scan>, reports: mpsc::Sender<PipelineRun>) {
        tracing::info!(
            "Starting pool run: {} scans, {} workers",
            scans.len(),
            self.workers
        );

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(scans.len());
        let mut queue = scans.into_iter();
        let mut undispatched = Vec::new();

        while let Some(scan) = queue.next() {
            if !self.is_running().await {
                undispatched.push(scan);
                undispatched.extend(queue.by_ref());
                break;
            }

            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    undispatched.push(scan);
                    undispatched.extend(queue.by_ref());
                    break;
                }
            };

            // Stop may have been requested while waiting for a slot.
            if !self.is_running().await {
                drop(permit);
                undispatched.push(scan);
                undispatched.extend(queue.by_ref());
                break;
            }

            self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
            self.stats.active.fetch_add(1, Ordering::Relaxed);
            metrics::WORKERS_ACTIVE.inc();

            let pipeline = self.pipeline.clone();
            let stats = Arc::clone(&self.stats);
            let reports = reports.clone();

            let handle = tokio::spawn(
                async move {
                    let _permit = permit;
                    let report = run_isolated(pipeline, scan).await;

                    stats.active.fetch_sub(1, Ordering::Relaxed);
                    metrics::WORKERS_ACTIVE.dec();
                    match report.status {
                        RunStatus::Completed => stats.completed.fetch_add(1, Ordering::Relaxed),
                        _ => stats.failed.fetch_add(1, Ordering::Relaxed),
                    };

                    if reports.send(report).await.is_err() {
                        tracing::warn!("Report channel closed, dropping scan outcome");
                    }
                }
                .in_current_span(),
            );
            handles.push(handle);
        }

        if !undispatched.is_empty() {
            tracing::warn!("{} scans not started", undispatched.len());
        }
        for scan in undispatched {
            self.stats.not_started.fetch_add(1, Ordering::Relaxed);
            let final_path = self
                .pipeline
                .namer()
                .final_path(scan.subject_id(), scan.base_name());
            if reports.send(PipelineRun::new(scan, final_path)).await.is_err() {
                tracing::warn!("Report channel closed, dropping scan outcome");
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Worker task failed: {}", e);
            }
        }

        tracing::info!("Pool run finished");
    }
}

/// Runs one scan in its own task and turns a panic into a failed run.
async fn run_isolated<R: StageRunner + 'static>(pipeline: ScanPipeline<R>, scan: Scan) -> PipelineRun {
    let final_path = pipeline
        .namer()
        .final_path(scan.subject_id(), scan.base_name());
    let task_scan = scan.clone();
    let inner = tokio::spawn(
        async move { pipeline.run(&task_scan).await }.in_current_span(),
    );

    match inner.await {
        Ok(run) => run,
        Err(e) => {
            let reason = panic_reason(e);
            tracing::error!(scan = %scan, "Worker crashed: {}", reason);
            metrics::SCANS_TOTAL.with_label_values(&["failed"]).inc();
            PipelineRun::crashed(scan, final_path, reason)
        }
    }
}

fn panic_reason(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(msg) = payload.downcast_ref::<&str>() {
                format!("panic: {}", msg)
            } else if let Some(msg) = payload.downcast_ref::<String>() {
                format!("panic: {}", msg)
            } else {
                "panic".to_string()
            }
        }
        Err(e) => e.to_string(),
    }
}
