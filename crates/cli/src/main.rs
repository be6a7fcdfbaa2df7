//! neuroprep CLI
//!
//! Batch MRI preprocessing (crop, bias correction, skull stripping,
//! reorientation, registration) and train/val/test manifest generation.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use neuroprep_core::config::SAMPLE_CONFIG;
use neuroprep_core::stage::resolve_program;
use neuroprep_core::{
    create_report_channel, discover, generate_manifests, load_config_with_overrides, metrics,
    require_preprocess_inputs, validate_config, ArtifactNamer, Config, ConfigOverrides,
    FslStageRunner, PoolStatus, RunSummary, ScanPipeline, Stage, StageRunner, WorkerPool,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration file read when `--config` is not given, if present.
const DEFAULT_CONFIG: &str = "neuroprep.toml";

#[derive(Parser)]
#[command(name = "neuroprep", version)]
#[command(about = "Parallel MRI preprocessing pipeline", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Path to configuration file [default: neuroprep.toml, if present]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(flatten)]
    preprocess: PreprocessArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Preprocess every scan under the source root (default if no command specified)
    Preprocess(PreprocessArgs),

    /// List the scans that would be processed
    Discover {
        /// Raw dataset root
        #[arg(short = 'p', long = "source")]
        source: Option<PathBuf>,

        /// Print scans as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write train/val/test CSV manifests
    Split(SplitArgs),

    /// Validate configuration and tool availability
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct PreprocessArgs {
    /// Raw dataset root (<root>/<class>/<subject>/.../<scan>)
    #[arg(short = 'p', long = "source")]
    source: Option<PathBuf>,

    /// Output root for stage artifacts
    #[arg(short = 't', long = "target")]
    target: Option<PathBuf>,

    /// Path of the flirt executable
    #[arg(short = 'r', long = "register")]
    flirt: Option<PathBuf>,

    /// Reference atlas (MNI152_T1_1mm_brain.nii.gz)
    #[arg(short = 'm', long = "reference")]
    reference: Option<PathBuf>,

    /// Keep only the registered volume of each scan
    #[arg(short = 'n', long)]
    delete_intermediates: bool,

    /// Scans processed concurrently
    #[arg(short = 'c', long)]
    workers: Option<usize>,

    /// Per-stage timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Write a JSON run summary to this path
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Write Prometheus metrics to this path when the run ends
    #[arg(long)]
    metrics_out: Option<PathBuf>,

    /// Exit with a non-zero status if any scan failed
    #[arg(long)]
    strict: bool,
}

impl PreprocessArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            source_root: self.source.clone(),
            target_root: self.target.clone(),
            flirt: self.flirt.clone(),
            reference: self.reference.clone(),
            delete_intermediates: self.delete_intermediates.then_some(true),
            workers: self.workers,
            stage_timeout_secs: self.timeout,
            ..Default::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
struct SplitArgs {
    /// Dataset root holding one directory per class [default: source_root]
    #[arg(long)]
    root: Option<PathBuf>,

    /// Training share in percent
    #[arg(long)]
    train: Option<u32>,

    /// Validation share in percent
    #[arg(long)]
    valid: Option<u32>,

    /// Test share in percent
    #[arg(long)]
    test: Option<u32>,

    /// Shuffle seed
    #[arg(long)]
    seed: Option<u64>,

    /// Directory manifests are written to
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// JSON document written by `--summary`.
#[derive(Serialize)]
struct RunReport<'a> {
    version: &'static str,
    config_hash: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    pool: &'a PoolStatus,
    summary: &'a RunSummary,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = resolve_config_path(cli.config);

    match cli.command {
        None => preprocess_command(config_path.as_deref(), cli.preprocess).await,
        Some(Commands::Preprocess(args)) => preprocess_command(config_path.as_deref(), args).await,
        Some(Commands::Discover { source, json }) => {
            discover_command(config_path.as_deref(), source, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Split(args)) => {
            split_command(config_path.as_deref(), args)?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Validate) => validate_command(config_path.as_deref()).await,
        Some(Commands::GenerateConfig { output, force }) => {
            generate_config_command(&output, force)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// An explicit `--config` must exist; the default file is optional.
fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG);
        default.exists().then_some(default)
    })
}

fn load(config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Config> {
    match config_path {
        Some(path) => info!("Loading configuration from {:?}", path),
        None => info!("No configuration file, using defaults and environment"),
    }
    load_config_with_overrides(config_path, overrides).with_context(|| match config_path {
        Some(path) => format!("Failed to load config from {:?}", path),
        None => "Failed to load config".to_string(),
    })
}

fn config_hash(config: &Config) -> String {
    let config_json = serde_json::to_string(config).unwrap_or_default();
    let hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    hash[..16].to_string()
}

async fn preprocess_command(config_path: Option<&Path>, args: PreprocessArgs) -> Result<ExitCode> {
    let config = load(config_path, &args.overrides())?;
    validate_config(&config).context("Configuration validation failed")?;
    let (source_root, target_root) =
        require_preprocess_inputs(&config).context("Configuration validation failed")?;

    let config_hash = config_hash(&config);
    info!(
        version = VERSION,
        config_hash = %config_hash,
        "Configuration loaded successfully"
    );
    info!("Source root: {:?}", source_root);
    info!("Target root: {:?}", target_root);
    info!(
        "Workers: {}, delete intermediates: {}",
        config.pipeline.workers, config.pipeline.delete_intermediates
    );

    let scans = discover(&source_root, &config.discovery).context("Scan discovery failed")?;
    if scans.is_empty() {
        warn!("No scans found under {:?}", source_root);
    }

    let runner = FslStageRunner::new(config.tools.clone(), config.stages.clone())
        .with_timeout(config.pipeline.stage_timeout_secs);
    runner
        .validate()
        .await
        .context("Stage tools are not available")?;

    let pipeline = ScanPipeline::new(Arc::new(runner), ArtifactNamer::new(&target_root))
        .with_delete_intermediates(config.pipeline.delete_intermediates);
    let pool = Arc::new(WorkerPool::new(pipeline, config.pipeline.workers));

    let (reports, collector) = create_report_channel(config.pipeline.report_buffer);
    let collector_handle = tokio::spawn(collector.run());

    // Stop dispatching on Ctrl+C / SIGTERM; running scans finish.
    let stopper = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            shutdown_signal().await;
            warn!("Shutdown requested, finishing running scans");
            pool.stop().await;
        })
    };

    let started_at = Utc::now();
    let status = pool.run(scans, reports).await;
    let finished_at = Utc::now();
    stopper.abort();

    let summary = collector_handle
        .await
        .context("Report collector failed")?;

    if let Some(path) = &args.summary {
        let report = RunReport {
            version: VERSION,
            config_hash: &config_hash,
            started_at,
            finished_at,
            pool: &status,
            summary: &summary,
        };
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write summary to {:?}", path))?;
        info!("Run summary written to {:?}", path);
    }

    if let Some(path) = &args.metrics_out {
        std::fs::write(path, metrics::render())
            .with_context(|| format!("Failed to write metrics to {:?}", path))?;
    }

    println!(
        "{} scans: {} completed ({} already complete), {} failed, {} not started",
        summary.total, summary.completed, summary.resumed, summary.failed, summary.not_started
    );
    for failure in &summary.failures {
        let stage = failure.stage.map(|s: Stage| s.as_str()).unwrap_or("-");
        println!("  FAILED {} [{}]: {}", failure.scan, stage, failure.error);
    }

    if args.strict && summary.has_failures() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn discover_command(config_path: Option<&Path>, source: Option<PathBuf>, json: bool) -> Result<()> {
    let overrides = ConfigOverrides {
        source_root: source,
        ..Default::default()
    };
    let config = load(config_path, &overrides)?;
    validate_config(&config).context("Configuration validation failed")?;

    let Some(source_root) = &config.source_root else {
        bail!("source_root is required (--source)");
    };
    let scans = discover(source_root, &config.discovery).context("Scan discovery failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&scans)?);
    } else {
        for scan in &scans {
            println!(
                "{}\t{}\t{}\t{}",
                scan.class_label(),
                scan.subject_id(),
                scan.base_name(),
                scan.source_path().display()
            );
        }
    }
    info!("{} scans", scans.len());
    Ok(())
}

fn split_command(config_path: Option<&Path>, args: SplitArgs) -> Result<()> {
    let overrides = ConfigOverrides {
        split_train: args.train,
        split_valid: args.valid,
        split_test: args.test,
        split_seed: args.seed,
        split_output_dir: args.output,
        ..Default::default()
    };
    let config = load(config_path, &overrides)?;

    let Some(root) = args.root.or_else(|| config.source_root.clone()) else {
        bail!("dataset root is required (--root or source_root)");
    };

    let timestamp = chrono::Local::now().naive_local();
    let paths = generate_manifests(&root, &config.split, &config.split.output_dir, timestamp)
        .context("Manifest generation failed")?;

    println!("train\t{}\t{}", paths.counts[0], paths.train.display());
    println!("val\t{}\t{}", paths.counts[1], paths.val.display());
    println!("test\t{}\t{}", paths.counts[2], paths.test.display());
    println!("all\t{}", paths.all.display());
    Ok(())
}

async fn validate_command(config_path: Option<&Path>) -> Result<ExitCode> {
    let config = load(config_path, &ConfigOverrides::default())?;
    validate_config(&config).context("Configuration validation failed")?;
    println!("Configuration valid (hash {})", config_hash(&config));

    for stage in Stage::ALL {
        let program = config.tools.program(stage);
        match resolve_program(program) {
            Some(path) => println!("  {:<13} {}", stage.as_str(), path.display()),
            None => println!("  {:<13} {} (not found)", stage.as_str(), program.display()),
        }
    }

    let runner = FslStageRunner::new(config.tools.clone(), config.stages.clone());
    match runner.validate().await {
        Ok(()) => {
            println!("Stage tools available");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{}", e);
            println!("Stage tools not available: {}", e.cause);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn generate_config_command(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{:?} already exists (use --force to overwrite)", output);
    }
    std::fs::write(output, SAMPLE_CONFIG)
        .with_context(|| format!("Failed to write {:?}", output))?;
    println!("Configuration written to {}", output.display());
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
