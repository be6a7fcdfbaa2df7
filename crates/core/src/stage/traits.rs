//! Trait definitions for the stage module.

use async_trait::async_trait;

use super::error::StageError;
use super::types::{StageJob, StageReport};

/// Executes one external transformation stage.
///
/// A call is atomic from the pipeline's point of view: no retries and no
/// cleanup happen inside the runner. On failure the output file may or may
/// not exist and must not be treated as valid.
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Returns the name of this runner implementation.
    fn name(&self) -> &str;

    /// Runs one stage, producing `job.output_path` on success.
    async fn run(&self, job: &StageJob) -> Result<StageReport, StageError>;

    /// Checks that the runner's tools and reference data are available.
    async fn validate(&self) -> Result<(), StageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{Stage, StageFailure};
    use std::path::PathBuf;

    struct EchoRunner;

    #[async_trait]
    impl StageRunner for EchoRunner {
        fn name(&self) -> &str {
            "echo"
        }

        async fn run(&self, job: &StageJob) -> Result<StageReport, StageError> {
            if job.stage == Stage::Register {
                return Err(StageError::new(
                    job.stage,
                    &job.scan_id,
                    StageFailure::Other("no atlas".to_string()),
                ));
            }
            Ok(StageReport {
                stage: job.stage,
                output_path: job.output_path.clone(),
                output_size_bytes: 0,
                duration_ms: 0,
            })
        }

        async fn validate(&self) -> Result<(), StageError> {
            Ok(())
        }
    }

    fn job(stage: Stage) -> StageJob {
        StageJob {
            scan_id: "s1/scan".to_string(),
            stage,
            input_path: PathBuf::from("/in.nii"),
            output_path: PathBuf::from("/out.nii.gz"),
        }
    }

    #[tokio::test]
    async fn test_runner_as_trait_object() {
        let runner: Box<dyn StageRunner> = Box::new(EchoRunner);
        assert_eq!(runner.name(), "echo");

        let report = runner.run(&job(Stage::Crop)).await.unwrap();
        assert_eq!(report.stage, Stage::Crop);
        assert_eq!(report.output_path, PathBuf::from("/out.nii.gz"));

        let err = runner.run(&job(Stage::Register)).await.unwrap_err();
        assert_eq!(err.stage, Stage::Register);
        assert_eq!(err.scan, "s1/scan");
    }
}
