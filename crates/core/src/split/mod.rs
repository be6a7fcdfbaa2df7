//! Train/validation/test manifest generation.
//!
//! Produces the CSV manifests consumed by model training from a directory of
//! preprocessed volumes grouped by class (`<root>/AD/...`, `<root>/NC/...`).

mod config;
mod error;
mod manifest;

pub use config::SplitPlan;
pub use error::{SplitConfigError, SplitError};
pub use manifest::{
    generate_manifests, read_manifest, ManifestEntry, ManifestPaths, Split,
};
