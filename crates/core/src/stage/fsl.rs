//! FSL/ANTs-based stage runner implementation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use super::config::{StageParams, ToolPaths};
use super::error::{StageError, StageFailure};
use super::traits::StageRunner;
use super::types::{Stage, StageJob, StageReport};

/// Number of trailing stderr lines kept in a failure report.
const STDERR_TAIL_LINES: usize = 20;

/// Default per-stage timeout (2 hours).
const DEFAULT_TIMEOUT_SECS: u64 = 7200;

/// Runs each stage as one external FSL or ANTs process.
pub struct FslStageRunner {
    tools: ToolPaths,
    params: StageParams,
    timeout_secs: u64,
}

impl FslStageRunner {
    /// Creates a runner with the given tools and parameters.
    pub fn new(tools: ToolPaths, params: StageParams) -> Self {
        Self {
            tools,
            params,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Sets the per-stage timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    /// Builds the argument list for one stage invocation.
    fn build_args(&self, stage: Stage, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy().to_string();
        let output = output.to_string_lossy().to_string();

        match stage {
            Stage::Crop => vec!["-i".to_string(), input, "-r".to_string(), output],
            Stage::BiasCorrect => vec![
                "-d".to_string(),
                self.params.n4_dimension.to_string(),
                "-i".to_string(),
                input,
                "-o".to_string(),
                output,
            ],
            Stage::SkullStrip => vec![
                input,
                output,
                "-f".to_string(),
                self.params.bet_fraction.to_string(),
                "-g".to_string(),
                self.params.bet_gradient.to_string(),
            ],
            Stage::Reorient => vec![input, output],
            Stage::Register => vec![
                "-in".to_string(),
                input,
                "-ref".to_string(),
                self.tools.reference.to_string_lossy().to_string(),
                "-out".to_string(),
                output,
                "-bins".to_string(),
                self.params.flirt_bins.to_string(),
                "-cost".to_string(),
                self.params.flirt_cost.as_arg().to_string(),
                "-dof".to_string(),
                self.params.flirt_dof.to_string(),
                "-interp".to_string(),
                self.params.flirt_interp.as_arg().to_string(),
            ],
        }
    }

    fn fail(job: &StageJob, cause: StageFailure) -> StageError {
        StageError::new(job.stage, &job.scan_id, cause)
    }
}

/// Resolves a program path the way the OS would when spawning it.
///
/// Paths with a directory component must exist; bare names are looked up on `PATH`.
pub fn resolve_program(program: &Path) -> Option<PathBuf> {
    let has_dir = program
        .parent()
        .map(|p| !p.as_os_str().is_empty())
        .unwrap_or(false);

    if has_dir {
        return program.is_file().then(|| program.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

fn stderr_tail(stderr: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    Some(lines[start..].join("\n"))
}

#[async_trait]
impl StageRunner for FslStageRunner {
    fn name(&self) -> &str {
        "fsl"
    }

    async fn run(&self, job: &StageJob) -> Result<StageReport, StageError> {
        let start = Instant::now();

        if !tokio::fs::try_exists(&job.input_path).await.unwrap_or(false) {
            return Err(Self::fail(
                job,
                StageFailure::InputNotFound {
                    path: job.input_path.clone(),
                },
            ));
        }

        if let Some(parent) = job.output_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Self::fail(
                    job,
                    StageFailure::OutputDirectory {
                        path: parent.to_path_buf(),
                        source: e,
                    },
                )
            })?;
        }

        let program = self.tools.program(job.stage);
        let args = self.build_args(job.stage, &job.input_path, &job.output_path);
        tracing::debug!(
            scan = %job.scan_id,
            stage = %job.stage,
            "{} {}",
            program.display(),
            args.join(" ")
        );

        // kill_on_drop: if the timeout fires or the worker task is aborted,
        // dropping the future takes the child process down with it.
        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Self::fail(
                        job,
                        StageFailure::ToolNotFound {
                            path: program.clone(),
                        },
                    )
                } else {
                    Self::fail(
                        job,
                        StageFailure::Spawn {
                            program: program.display().to_string(),
                            source: e,
                        },
                    )
                }
            })?;

        let output = match timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Self::fail(
                    job,
                    StageFailure::Spawn {
                        program: program.display().to_string(),
                        source: e,
                    },
                ))
            }
            Err(_) => {
                return Err(Self::fail(
                    job,
                    StageFailure::Timeout {
                        timeout_secs: self.timeout_secs,
                    },
                ))
            }
        };

        if !output.status.success() {
            return Err(Self::fail(
                job,
                StageFailure::NonZeroExit {
                    program: program.display().to_string(),
                    code: output.status.code(),
                    stderr: stderr_tail(&output.stderr),
                },
            ));
        }

        let output_meta = tokio::fs::metadata(&job.output_path).await.map_err(|_| {
            Self::fail(
                job,
                StageFailure::MissingOutput {
                    path: job.output_path.clone(),
                },
            )
        })?;

        Ok(StageReport {
            stage: job.stage,
            output_path: job.output_path.clone(),
            output_size_bytes: output_meta.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn validate(&self) -> Result<(), StageError> {
        for stage in Stage::ALL {
            let program = self.tools.program(stage);
            if resolve_program(program).is_none() {
                return Err(StageError::new(
                    stage,
                    program.display().to_string(),
                    StageFailure::ToolNotFound {
                        path: program.clone(),
                    },
                ));
            }
        }

        if !self.tools.reference.is_file() {
            return Err(StageError::new(
                Stage::Register,
                self.tools.reference.display().to_string(),
                StageFailure::ReferenceNotFound {
                    path: self.tools.reference.clone(),
                },
            ));
        }

        Ok(())
    }
}


#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn job(dir: &Path, stage: Stage) -> StageJob {
        let input = dir.join("in.nii");
        std::fs::write(&input, b"volume").unwrap();
        StageJob {
            scan_id: "002_S_0295/I45108".to_string(),
            stage,
            input_path: input,
            output_path: dir.join("subject/out.nii.gz"),
        }
    }

    #[tokio::test]
    async fn test_successful_process_produces_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut tools = ToolPaths::with_reference("/ref.nii.gz");
        // fslreorient2std <in> <out>
        tools.fslreorient2std = write_script(dir.path(), "reorient", r#"cp "$1" "$2""#);
        let runner = FslStageRunner::new(tools, StageParams::default());

        let job = job(dir.path(), Stage::Reorient);
        let report = runner.run(&job).await.unwrap();
        assert_eq!(report.stage, Stage::Reorient);
        assert_eq!(report.output_size_bytes, 6);
        assert!(job.output_path.exists());
    }

    #[tokio::test]
    async fn test_non_zero_exit_captures_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let mut tools = ToolPaths::with_reference("/ref.nii.gz");
        tools.bet = write_script(dir.path(), "bet", "echo 'Image Exception : #22' >&2\nexit 3");
        let runner = FslStageRunner::new(tools, StageParams::default());

        let err = runner.run(&job(dir.path(), Stage::SkullStrip)).await.unwrap_err();
        match err.cause {
            StageFailure::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr.as_deref(), Some("Image Exception : #22"));
            }
            other => panic!("unexpected failure: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_success_without_output_is_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut tools = ToolPaths::with_reference("/ref.nii.gz");
        tools.robustfov = write_script(dir.path(), "robustfov", "exit 0");
        let runner = FslStageRunner::new(tools, StageParams::default());

        let err = runner.run(&job(dir.path(), Stage::Crop)).await.unwrap_err();
        assert!(matches!(err.cause, StageFailure::MissingOutput { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let mut tools = ToolPaths::with_reference("/ref.nii.gz");
        tools.flirt = write_script(dir.path(), "flirt", "sleep 30");
        let runner = FslStageRunner::new(tools, StageParams::default()).with_timeout(1);

        let started = Instant::now();
        let err = runner.run(&job(dir.path(), Stage::Register)).await.unwrap_err();
        assert!(matches!(err.cause, StageFailure::Timeout { timeout_secs: 1 }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
