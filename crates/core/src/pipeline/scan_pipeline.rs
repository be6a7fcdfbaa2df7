//! Per-scan stage sequencing.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::artifact::ArtifactNamer;
use crate::discovery::Scan;
use crate::metrics;
use crate::stage::{Stage, StageJob, StageRunner};

use super::error::PipelineError;
use super::types::{PipelineRun, RunStatus};

/// Drives one scan through every stage in order.
///
/// Stage 1 consumes the raw volume and stage k consumes the artifact of
/// stage k-1. The final stage writes to a staging path that is renamed to
/// the final artifact only once it succeeded, so the final artifact existing
/// always means the scan is complete.
pub struct ScanPipeline<R: StageRunner> {
    runner: Arc<R>,
    namer: ArtifactNamer,
    delete_intermediates: bool,
}

impl<R: StageRunner> Clone for ScanPipeline<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            namer: self.namer.clone(),
            delete_intermediates: self.delete_intermediates,
        }
    }
}

impl<R: StageRunner> ScanPipeline<R> {
    pub fn new(runner: Arc<R>, namer: ArtifactNamer) -> Self {
        Self {
            runner,
            namer,
            delete_intermediates: false,
        }
    }

    /// Remove intermediate artifacts after a scan completes.
    pub fn with_delete_intermediates(mut self, delete: bool) -> Self {
        self.delete_intermediates = delete;
        self
    }

    pub fn namer(&self) -> &ArtifactNamer {
        &self.namer
    }

    pub fn runner(&self) -> &Arc<R> {
        &self.runner
    }

    /// Processes one scan. Never returns an error: failures are recorded in
    /// the returned run.
    pub async fn run(&self, scan: &Scan) -> PipelineRun {
        let final_path = self.namer.final_path(scan.subject_id(), scan.base_name());
        let mut run = PipelineRun::new(scan.clone(), final_path.clone());
        run.status = RunStatus::InProgress;

        if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
            tracing::debug!(scan = %scan, "Final artifact exists, skipping");
            run.resumed = true;
            run.status = RunStatus::Completed;
            metrics::SCANS_TOTAL.with_label_values(&["resumed"]).inc();
            return run;
        }

        tracing::info!(scan = %scan, source = %scan.source_path().display(), "Processing scan");

        let start = Instant::now();
        let result = self.run_stages(scan, &mut run).await;

        if result.is_ok() && self.delete_intermediates {
            self.remove_intermediates(scan).await;
        }
        run.duration = start.elapsed();

        let label = match result {
            Ok(()) => {
                run.status = RunStatus::Completed;
                tracing::debug!(
                    scan = %scan,
                    duration_ms = run.duration.as_millis() as u64,
                    "Scan completed"
                );
                "completed"
            }
            Err(e) => {
                tracing::debug!(
                    scan = %scan,
                    stage = ?e.stage().map(|s| s.as_str()),
                    "Scan failed: {}",
                    e
                );
                run.status = RunStatus::Failed;
                run.error = Some(e);
                "failed"
            }
        };

        metrics::SCANS_TOTAL.with_label_values(&[label]).inc();
        metrics::SCAN_DURATION
            .with_label_values(&[label])
            .observe(run.duration.as_secs_f64());

        run
    }

    async fn run_stages(&self, scan: &Scan, run: &mut PipelineRun) -> Result<(), PipelineError> {
        let subject_dir = self.namer.subject_dir(scan.subject_id());
        tokio::fs::create_dir_all(&subject_dir)
            .await
            .map_err(|source| PipelineError::Workspace {
                path: subject_dir.clone(),
                source,
            })?;

        let staging = self.namer.staging_path(scan.subject_id(), scan.base_name());
        let mut input = scan.source_path().to_path_buf();

        for stage in Stage::ALL {
            let output = if stage.is_final() {
                staging.clone()
            } else {
                self.namer
                    .artifact_path(scan.subject_id(), scan.base_name(), stage)
            };

            let job = StageJob {
                scan_id: scan.id(),
                stage,
                input_path: input,
                output_path: output.clone(),
            };

            run.stages_run.push(stage);
            let started = Instant::now();
            let result = self.runner.run(&job).await;
            metrics::STAGE_DURATION
                .with_label_values(&[stage.as_str()])
                .observe(started.elapsed().as_secs_f64());

            match result {
                Ok(report) => {
                    metrics::STAGE_INVOCATIONS
                        .with_label_values(&[stage.as_str(), "success"])
                        .inc();
                    tracing::debug!(
                        scan = %scan,
                        stage = %stage,
                        output_bytes = report.output_size_bytes,
                        duration_ms = report.duration_ms,
                        "Stage finished"
                    );
                }
                Err(e) => {
                    metrics::STAGE_INVOCATIONS
                        .with_label_values(&[stage.as_str(), "failed"])
                        .inc();
                    if let Some(stderr) = e.stderr() {
                        tracing::debug!(scan = %scan, stage = %stage, "stderr: {}", stderr);
                    }
                    if stage.is_final() {
                        discard(&staging).await;
                    }
                    return Err(e.into());
                }
            }

            input = output;
        }

        let final_path = &run.final_artifact;
        if let Err(source) = tokio::fs::rename(&staging, final_path).await {
            discard(&staging).await;
            return Err(PipelineError::Finalize {
                path: final_path.clone(),
                source,
            });
        }

        Ok(())
    }

    async fn remove_intermediates(&self, scan: &Scan) {
        for path in self
            .namer
            .intermediate_paths(scan.subject_id(), scan.base_name())
        {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(
                        scan = %scan,
                        path = %path.display(),
                        "Failed to remove intermediate artifact: {}",
                        e
                    );
                }
            }
        }
    }
}

/// Removes a leftover staging file, if any.
async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "Failed to remove partial artifact: {}", e),
    }
}

/// Paths a scan leaves behind on success, depending on cleanup.
pub fn expected_outputs(namer: &ArtifactNamer, scan: &Scan, delete_intermediates: bool) -> Vec<PathBuf> {
    if delete_intermediates {
        vec![namer.final_path(scan.subject_id(), scan.base_name())]
    } else {
        namer
            .artifacts(scan.subject_id(), scan.base_name())
            .into_iter()
            .map(|a| a.path)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockStageRunner};
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Scan, ArtifactNamer) {
        let source = dir.path().join("source");
        let scans = fixtures::build_source_tree(&source, &[("AD", "s1", "I1")], 5);
        let namer = ArtifactNamer::new(dir.path().join("target"));
        (scans.into_iter().next().unwrap(), namer)
    }

    #[tokio::test]
    async fn test_runs_every_stage_in_order() {
        let dir = TempDir::new().unwrap();
        let (scan, namer) = setup(&dir);
        let runner = Arc::new(MockStageRunner::new());
        let pipeline = ScanPipeline::new(Arc::clone(&runner), namer.clone());

        let run = pipeline.run(&scan).await;
        assert_eq!(run.status, RunStatus::Completed);
        assert!(!run.resumed);
        assert_eq!(run.stages_run, Stage::ALL.to_vec());
        assert!(run.final_artifact.exists());
        assert!(run.error.is_none());

        let jobs = runner.jobs_for(&scan.id()).await;
        assert_eq!(jobs.len(), 5);
        assert_eq!(jobs[0].input_path, scan.source_path());
        for pair in jobs.windows(2) {
            assert_eq!(pair[1].input_path, pair[0].output_path);
        }
        assert_eq!(
            jobs[4].output_path,
            namer.staging_path(scan.subject_id(), scan.base_name())
        );
        assert!(!jobs[4].output_path.exists());
    }

    #[tokio::test]
    async fn test_existing_final_artifact_is_resumed() {
        let dir = TempDir::new().unwrap();
        let (scan, namer) = setup(&dir);
        let final_path = namer.final_path(scan.subject_id(), scan.base_name());
        std::fs::create_dir_all(final_path.parent().unwrap()).unwrap();
        std::fs::write(&final_path, b"done").unwrap();

        let runner = Arc::new(MockStageRunner::new());
        let pipeline = ScanPipeline::new(Arc::clone(&runner), namer);

        let run = pipeline.run(&scan).await;
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.resumed);
        assert!(run.stages_run.is_empty());
        assert_eq!(runner.invocation_count().await, 0);
    }

    #[tokio::test]
    async fn test_stage_failure_aborts_remaining_stages() {
        let dir = TempDir::new().unwrap();
        let (scan, namer) = setup(&dir);
        let runner = Arc::new(MockStageRunner::new());
        runner.fail_on(&scan.id(), Stage::SkullStrip).await;
        let pipeline = ScanPipeline::new(Arc::clone(&runner), namer);

        let run = pipeline.run(&scan).await;
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(
            run.stages_run,
            vec![Stage::Crop, Stage::BiasCorrect, Stage::SkullStrip]
        );
        assert_eq!(run.failed_stage(), Some(Stage::SkullStrip));
        assert!(!run.final_artifact.exists());
        assert_eq!(runner.invocation_count().await, 3);
    }

    #[tokio::test]
    async fn test_failed_final_stage_leaves_no_final_artifact() {
        let dir = TempDir::new().unwrap();
        let (scan, namer) = setup(&dir);
        let runner = Arc::new(MockStageRunner::new());
        runner.set_partial_output_on_failure(true);
        runner.fail_on(&scan.id(), Stage::Register).await;
        let pipeline = ScanPipeline::new(Arc::clone(&runner), namer.clone());

        let run = pipeline.run(&scan).await;
        assert!(run.is_failed());
        assert!(!run.final_artifact.exists());
        assert!(!namer
            .staging_path(scan.subject_id(), scan.base_name())
            .exists());

        // A later run must redo the scan instead of treating it as complete.
        let retry = ScanPipeline::new(Arc::new(MockStageRunner::new()), namer);
        let run = retry.run(&scan).await;
        assert!(run.is_completed());
        assert!(!run.resumed);
    }

    #[tokio::test]
    async fn test_delete_intermediates_keeps_only_final() {
        let dir = TempDir::new().unwrap();
        let (scan, namer) = setup(&dir);
        let pipeline = ScanPipeline::new(Arc::new(MockStageRunner::new()), namer.clone())
            .with_delete_intermediates(true);

        let run = pipeline.run(&scan).await;
        assert!(run.is_completed());

        let remaining: Vec<PathBuf> = std::fs::read_dir(namer.subject_dir(scan.subject_id()))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(remaining, expected_outputs(&namer, &scan, true));
        assert!(scan.source_path().exists());
    }

    #[tokio::test]
    async fn test_intermediates_kept_by_default() {
        let dir = TempDir::new().unwrap();
        let (scan, namer) = setup(&dir);
        let pipeline = ScanPipeline::new(Arc::new(MockStageRunner::new()), namer.clone());

        pipeline.run(&scan).await;
        for path in expected_outputs(&namer, &scan, false) {
            assert!(path.exists(), "missing {}", path.display());
        }
    }
}
