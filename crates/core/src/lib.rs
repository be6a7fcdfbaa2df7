pub mod artifact;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod metrics;
pub mod pipeline;
pub mod split;
pub mod stage;
pub mod testing;

pub use artifact::{Artifact, ArtifactNamer};
pub use config::{
    load_config, load_config_from_str, load_config_with_overrides, require_preprocess_inputs,
    validate_config, Config, ConfigError, ConfigOverrides,
};
pub use coordinator::{create_report_channel, PoolStatus, ReportCollector, RunSummary, WorkerPool};
pub use discovery::{discover, DiscoveryConfig, DiscoveryError, Scan};
pub use pipeline::{PipelineConfig, PipelineError, PipelineRun, RunStatus, ScanPipeline};
pub use split::{generate_manifests, ManifestPaths, SplitConfigError, SplitError, SplitPlan};
pub use stage::{
    FslStageRunner, Stage, StageError, StageFailure, StageJob, StageParams, StageReport,
    StageRunner, ToolPaths,
};
