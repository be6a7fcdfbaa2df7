use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::discovery::DiscoveryConfig;
use crate::pipeline::PipelineConfig;
use crate::split::SplitPlan;
use crate::stage::{StageParams, ToolPaths};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Raw dataset root (`<root>/<class>/<subject>/.../<scan>`).
    #[serde(default)]
    pub source_root: Option<PathBuf>,
    /// Output root for every stage artifact.
    #[serde(default)]
    pub target_root: Option<PathBuf>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub tools: ToolPaths,
    #[serde(default)]
    pub stages: StageParams,
    #[serde(default)]
    pub split: SplitPlan,
}

/// Annotated sample written by `neuroprep generate-config`.
pub const SAMPLE_CONFIG: &str = r#"# neuroprep configuration
#
# Every value can be overridden with NEUROPREP_<SECTION>__<KEY>, e.g.
# NEUROPREP_PIPELINE__WORKERS=4, and by command-line flags.

source_root = "/data/ADNI"
target_root = "/data/processed"

[pipeline]
# Scans processed concurrently
workers = 8
# Keep only the registered volume of each scan
delete_intermediates = false
stage_timeout_secs = 7200
report_buffer = 256

[discovery]
# Components from source_root to a scan file, the file included
scan_depth = 6
scan_pattern = '(?i)\.nii(\.gz)?$'

[tools]
robustfov = "robustfov"
n4 = "N4BiasFieldCorrection"
bet = "bet"
fslreorient2std = "fslreorient2std"
flirt = "flirt"
reference = "/usr/local/fsl/data/standard/MNI152_T1_1mm_brain.nii.gz"

[stages]
n4_dimension = 3
bet_fraction = 0.5
bet_gradient = 0.0
flirt_bins = 256
flirt_cost = "corratio"
flirt_dof = 12
flirt_interp = "trilinear"

[split]
train = 70
valid = 15
test = 15
seed = 42
output_dir = "manifests"

[split.labels]
AD = 1
NC = 0
"#;
