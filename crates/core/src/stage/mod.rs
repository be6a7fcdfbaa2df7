//! Stage module: one external transformation per call.
//!
//! This module provides the `StageRunner` trait and the `FslStageRunner`
//! implementation, which maps every normalization stage onto one FSL or ANTs
//! executable:
//!
//! | Stage | Executable |
//! |---|---|
//! | crop | `robustfov` |
//! | bias correct | `N4BiasFieldCorrection` |
//! | skull strip | `bet` |
//! | reorient | `fslreorient2std` |
//! | register | `flirt` |
//!
//! # Example
//!
//! ```ignore
//! use neuroprep_core::stage::{FslStageRunner, Stage, StageJob, StageParams, StageRunner, ToolPaths};
//!
//! let runner = FslStageRunner::new(
//!     ToolPaths::with_reference("/opt/fsl/data/standard/MNI152_T1_1mm_brain.nii.gz"),
//!     StageParams::default(),
//! )
//! .with_timeout(3600);
//!
//! runner.validate().await?;
//!
//! let report = runner
//!     .run(&StageJob {
//!         scan_id: "002_S_0295/I45108".to_string(),
//!         stage: Stage::Crop,
//!         input_path: PathBuf::from("/data/ADNI/AD/002_S_0295/.../I45108.nii"),
//!         output_path: PathBuf::from("/data/out/002_S_0295/I45108_cropped.nii.gz"),
//!     })
//!     .await?;
//! println!("cropped in {} ms", report.duration_ms);
//! ```

mod config;
mod error;
mod fsl;
mod traits;
mod types;

pub use config::{Interpolation, RegistrationCost, StageParams, ToolPaths};
pub use error::{StageError, StageFailure};
pub use fsl::{resolve_program, FslStageRunner};
pub use traits::StageRunner;
pub use types::{Stage, StageJob, StageReport};
