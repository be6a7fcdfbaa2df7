//! Deterministic artifact paths.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::stage::Stage;

/// File extension of every produced artifact.
pub const ARTIFACT_EXTENSION: &str = "nii.gz";

/// Suffix of the file the final stage writes before it is promoted.
const STAGING_SUFFIX: &str = "registered.partial";

/// One stage output for one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub stage: Stage,
    pub path: PathBuf,
}

/// Derives artifact paths from `(target_root, subject_id, base_name, stage)`.
///
/// Layout: `<target_root>/<subject_id>/<base_name>_<suffix>.nii.gz`. The
/// mapping is a pure function of its inputs; nothing is read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNamer {
    target_root: PathBuf,
}

impl ArtifactNamer {
    pub fn new(target_root: impl Into<PathBuf>) -> Self {
        Self {
            target_root: target_root.into(),
        }
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    /// Directory holding every artifact of one subject.
    pub fn subject_dir(&self, subject_id: &str) -> PathBuf {
        self.target_root.join(subject_id)
    }

    /// Path of the artifact a stage produces for a scan.
    pub fn artifact_path(&self, subject_id: &str, base_name: &str, stage: Stage) -> PathBuf {
        self.file_in_subject(subject_id, base_name, stage.suffix())
    }

    /// Path of the registered artifact that marks a scan complete.
    pub fn final_path(&self, subject_id: &str, base_name: &str) -> PathBuf {
        self.artifact_path(subject_id, base_name, Stage::FINAL)
    }

    /// Where the final stage writes before the result is renamed into place.
    pub fn staging_path(&self, subject_id: &str, base_name: &str) -> PathBuf {
        self.file_in_subject(subject_id, base_name, STAGING_SUFFIX)
    }

    /// All five artifacts of a scan, in stage order.
    pub fn artifacts(&self, subject_id: &str, base_name: &str) -> Vec<Artifact> {
        Stage::ALL
            .iter()
            .map(|&stage| Artifact {
                stage,
                path: self.artifact_path(subject_id, base_name, stage),
            })
            .collect()
    }

    /// The non-final artifacts of a scan (removed by intermediate cleanup).
    pub fn intermediate_paths(&self, subject_id: &str, base_name: &str) -> Vec<PathBuf> {
        Stage::ALL
            .iter()
            .filter(|stage| !stage.is_final())
            .map(|&stage| self.artifact_path(subject_id, base_name, stage))
            .collect()
    }

    fn file_in_subject(&self, subject_id: &str, base_name: &str, suffix: &str) -> PathBuf {
        self.subject_dir(subject_id)
            .join(format!("{}_{}.{}", base_name, suffix, ARTIFACT_EXTENSION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_artifact_layout() {
        let namer = ArtifactNamer::new("/out");
        assert_eq!(
            namer.artifact_path("002_S_0295", "I45108", Stage::Crop),
            PathBuf::from("/out/002_S_0295/I45108_cropped.nii.gz")
        );
        assert_eq!(
            namer.artifact_path("002_S_0295", "I45108", Stage::BiasCorrect),
            PathBuf::from("/out/002_S_0295/I45108_n4bias.nii.gz")
        );
        assert_eq!(
            namer.final_path("002_S_0295", "I45108"),
            PathBuf::from("/out/002_S_0295/I45108_registered.nii.gz")
        );
    }

    #[test]
    fn test_paths_are_deterministic() {
        let a = ArtifactNamer::new("/out");
        let b = ArtifactNamer::new(PathBuf::from("/out"));
        for stage in Stage::ALL {
            let first = a.artifact_path("subj", "scan", stage);
            assert_eq!(first, a.artifact_path("subj", "scan", stage));
            assert_eq!(first, b.artifact_path("subj", "scan", stage));
        }
    }

    #[test]
    fn test_distinct_stages_produce_distinct_paths() {
        let namer = ArtifactNamer::new("/out");
        let mut paths: HashSet<PathBuf> = namer
            .artifacts("subj", "scan")
            .into_iter()
            .map(|a| a.path)
            .collect();
        assert_eq!(paths.len(), Stage::ALL.len());
        assert!(paths.insert(namer.staging_path("subj", "scan")));
    }

    #[test]
    fn test_subjects_never_collide() {
        let namer = ArtifactNamer::new("/out");
        for stage in Stage::ALL {
            let a = namer.artifact_path("subj_a", "scan", stage);
            let b = namer.artifact_path("subj_b", "scan", stage);
            assert_ne!(a, b);
            assert_ne!(a.parent(), b.parent());
        }
    }

    #[test]
    fn test_suffixed_base_names_do_not_collide() {
        // "scan_cropped" is a legal base name; its final artifact must not
        // land on the crop artifact of "scan".
        let namer = ArtifactNamer::new("/out");
        let all_of = |base: &str| -> HashSet<PathBuf> {
            let mut set: HashSet<PathBuf> =
                namer.artifacts("s", base).into_iter().map(|a| a.path).collect();
            set.insert(namer.staging_path("s", base));
            set
        };
        let plain = all_of("scan");
        let suffixed = all_of("scan_cropped");
        assert!(plain.is_disjoint(&suffixed));
    }

    #[test]
    fn test_intermediates_exclude_final() {
        let namer = ArtifactNamer::new("/out");
        let intermediates = namer.intermediate_paths("s", "b");
        assert_eq!(intermediates.len(), 4);
        assert!(!intermediates.contains(&namer.final_path("s", "b")));
    }
}
