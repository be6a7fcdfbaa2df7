//! Configuration for the stage module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::types::Stage;

/// Locations of the external executables and the reference atlas.
///
/// Bare names (no directory component) are resolved through `PATH`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPaths {
    /// FSL `robustfov`.
    #[serde(default = "default_robustfov")]
    pub robustfov: PathBuf,

    /// ANTs `N4BiasFieldCorrection`.
    #[serde(default = "default_n4")]
    pub n4: PathBuf,

    /// FSL `bet`.
    #[serde(default = "default_bet")]
    pub bet: PathBuf,

    /// FSL `fslreorient2std`.
    #[serde(default = "default_fslreorient2std")]
    pub fslreorient2std: PathBuf,

    /// FSL `flirt`.
    #[serde(default = "default_flirt")]
    pub flirt: PathBuf,

    /// Reference atlas volume, e.g. `MNI152_T1_1mm_brain.nii.gz`. Required
    /// for preprocessing, unset by default.
    #[serde(default)]
    pub reference: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self::with_reference(PathBuf::new())
    }
}

fn default_robustfov() -> PathBuf {
    PathBuf::from("robustfov")
}

fn default_n4() -> PathBuf {
    PathBuf::from("N4BiasFieldCorrection")
}

fn default_bet() -> PathBuf {
    PathBuf::from("bet")
}

fn default_fslreorient2std() -> PathBuf {
    PathBuf::from("fslreorient2std")
}

fn default_flirt() -> PathBuf {
    PathBuf::from("flirt")
}

impl ToolPaths {
    /// Tool paths with default executable names and the given reference atlas.
    pub fn with_reference(reference: impl Into<PathBuf>) -> Self {
        Self {
            robustfov: default_robustfov(),
            n4: default_n4(),
            bet: default_bet(),
            fslreorient2std: default_fslreorient2std(),
            flirt: default_flirt(),
            reference: reference.into(),
        }
    }

    pub fn has_reference(&self) -> bool {
        !self.reference.as_os_str().is_empty()
    }

    /// Executable that implements the given stage.
    pub fn program(&self, stage: Stage) -> &PathBuf {
        match stage {
            Stage::Crop => &self.robustfov,
            Stage::BiasCorrect => &self.n4,
            Stage::SkullStrip => &self.bet,
            Stage::Reorient => &self.fslreorient2std,
            Stage::Register => &self.flirt,
        }
    }
}

/// Cost function used by `flirt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationCost {
    Mutualinfo,
    Corratio,
    Normcorr,
    Normmi,
    Leastsq,
    Labeldiff,
    Bbr,
}

impl RegistrationCost {
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::Mutualinfo => "mutualinfo",
            Self::Corratio => "corratio",
            Self::Normcorr => "normcorr",
            Self::Normmi => "normmi",
            Self::Leastsq => "leastsq",
            Self::Labeldiff => "labeldiff",
            Self::Bbr => "bbr",
        }
    }
}

impl fmt::Display for RegistrationCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// Final interpolation used by `flirt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Trilinear,
    Nearestneighbour,
    Sinc,
    Spline,
}

impl Interpolation {
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::Trilinear => "trilinear",
            Self::Nearestneighbour => "nearestneighbour",
            Self::Sinc => "sinc",
            Self::Spline => "spline",
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// Parameters passed to the stage tools. Shared by every scan of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageParams {
    /// Image dimensionality passed to N4 (`-d`).
    #[serde(default = "default_n4_dimension")]
    pub n4_dimension: u8,

    /// Fractional intensity threshold for `bet` (`-f`).
    #[serde(default = "default_bet_fraction")]
    pub bet_fraction: f32,

    /// Vertical gradient in fractional intensity threshold for `bet` (`-g`).
    #[serde(default)]
    pub bet_gradient: f32,

    /// Histogram bins for `flirt` (`-bins`).
    #[serde(default = "default_flirt_bins")]
    pub flirt_bins: u32,

    /// Cost function for `flirt` (`-cost`).
    #[serde(default = "default_flirt_cost")]
    pub flirt_cost: RegistrationCost,

    /// Degrees of freedom for `flirt` (`-dof`).
    #[serde(default = "default_flirt_dof")]
    pub flirt_dof: u8,

    /// Interpolation for `flirt` (`-interp`).
    #[serde(default = "default_flirt_interp")]
    pub flirt_interp: Interpolation,
}

fn default_n4_dimension() -> u8 {
    3
}

fn default_bet_fraction() -> f32 {
    0.5
}

fn default_flirt_bins() -> u32 {
    256
}

fn default_flirt_cost() -> RegistrationCost {
    RegistrationCost::Corratio
}

fn default_flirt_dof() -> u8 {
    12
}

fn default_flirt_interp() -> Interpolation {
    Interpolation::Trilinear
}

impl Default for StageParams {
    fn default() -> Self {
        Self {
            n4_dimension: default_n4_dimension(),
            bet_fraction: default_bet_fraction(),
            bet_gradient: 0.0,
            flirt_bins: default_flirt_bins(),
            flirt_cost: default_flirt_cost(),
            flirt_dof: default_flirt_dof(),
            flirt_interp: default_flirt_interp(),
        }
    }
}
