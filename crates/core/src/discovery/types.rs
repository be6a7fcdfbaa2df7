//! Types for the discovery module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// One raw input volume.
///
/// Identity fields are derived from `source_path` relative to the source
/// root when the scan is constructed and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scan {
    source_path: PathBuf,
    class_label: String,
    subject_id: String,
    base_name: String,
}

impl Scan {
    /// Builds a scan from its location under `root`.
    ///
    /// Returns `None` when the path is not below `root`, has fewer than three
    /// components (`class/subject/file`), or has an empty base name.
    pub fn from_path(root: &Path, source_path: &Path) -> Option<Self> {
        let relative = source_path.strip_prefix(root).ok()?;
        let components: Vec<&str> = relative
            .components()
            .map(|c| match c {
                Component::Normal(name) => name.to_str(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;

        if components.len() < 3 {
            return None;
        }

        let file_name = components[components.len() - 1];
        let base_name = file_name.split('.').next().unwrap_or_default();
        if base_name.is_empty() {
            return None;
        }

        Some(Self {
            source_path: source_path.to_path_buf(),
            class_label: components[0].to_string(),
            subject_id: components[1].to_string(),
            base_name: base_name.to_string(),
        })
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Class directory the scan was found under (e.g. `AD`, `NC`).
    pub fn class_label(&self) -> &str {
        &self.class_label
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// File name up to its first `.`.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Short identity used in logs and errors: `subject/base_name`.
    pub fn id(&self) -> String {
        format!("{}/{}", self.subject_id, self.base_name)
    }
}

impl fmt::Display for Scan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject_id, self.base_name)
    }
}

/// Configuration for scan discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Number of path components from the source root down to a scan file,
    /// the file included. ADNI exports use
    /// `class/subject/series/acquisition-date/image-id/file`.
    #[serde(default = "default_scan_depth")]
    pub scan_depth: usize,

    /// Regex a file name must match to count as a scan.
    #[serde(default = "default_scan_pattern")]
    pub scan_pattern: String,
}

fn default_scan_depth() -> usize {
    6
}

fn default_scan_pattern() -> String {
    r"(?i)\.nii(\.gz)?$".to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            scan_depth: default_scan_depth(),
            scan_pattern: default_scan_pattern(),
        }
    }
}

impl DiscoveryConfig {
    pub fn with_depth(mut self, scan_depth: usize) -> Self {
        self.scan_depth = scan_depth;
        self
    }
}
