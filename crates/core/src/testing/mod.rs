//! Testing utilities and mock implementations.
//!
//! Lets the pipeline and worker pool run end to end without the external
//! neuroimaging tools installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use neuroprep_core::testing::{fixtures, MockStageRunner};
//!
//! let scans = fixtures::build_source_tree(root, &[("AD", "s1", "I1")], 6);
//! let runner = MockStageRunner::new();
//! runner.fail_on(&scans[0].id(), Stage::SkullStrip).await;
//! ```

mod mock_runner;

pub use mock_runner::{MockStageRunner, RecordedStage};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use crate::discovery::Scan;

    /// Filler directory names between the subject and the scan file.
    const FILLER: [&str; 3] = ["MPRAGE", "2006-04-18", "acq"];

    /// Path of a scan file at `depth` components below `root`.
    ///
    /// `depth` counts the class, subject and file components, so it must be
    /// at least 3.
    pub fn scan_path(root: &Path, class: &str, subject: &str, base: &str, depth: usize) -> PathBuf {
        assert!(depth >= 3, "depth must be at least 3");
        let mut path = root.join(class).join(subject);
        for i in 0..depth - 3 {
            let filler = FILLER.get(i).map(|s| s.to_string()).unwrap_or_else(|| format!("d{}", i));
            path.push(filler);
        }
        path.push(format!("{}.nii", base));
        path
    }

    /// Creates one raw volume per `(class, subject, base_name)` entry and
    /// returns the scans sorted by source path.
    pub fn build_source_tree(
        root: &Path,
        entries: &[(&str, &str, &str)],
        depth: usize,
    ) -> Vec<Scan> {
        let mut scans: Vec<Scan> = entries
            .iter()
            .map(|(class, subject, base)| {
                let path = scan_path(root, class, subject, base, depth);
                let parent = path.parent().expect("scan path has a parent");
                std::fs::create_dir_all(parent).expect("failed to create fixture directory");
                std::fs::write(&path, b"raw volume").expect("failed to write fixture scan");
                Scan::from_path(root, &path).expect("fixture path is a valid scan")
            })
            .collect();
        scans.sort_by(|a, b| a.source_path().cmp(b.source_path()));
        scans
    }

    /// Creates `count` entries per class under `<root>/<class>/` as used by
    /// manifest generation. Returns the created paths.
    pub fn build_class_entries(root: &Path, class: &str, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = root.join(class).join(format!("{}_{:03}.nii.gz", class, i));
                std::fs::create_dir_all(root.join(class)).expect("failed to create class directory");
                std::fs::write(&path, b"volume").expect("failed to write class entry");
                path
            })
            .collect()
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::discovery::{discover, DiscoveryConfig};
        use tempfile::TempDir;

        #[test]
        fn test_tree_matches_discovery() {
            let dir = TempDir::new().unwrap();
            let built = build_source_tree(
                dir.path(),
                &[("NC", "s2", "b"), ("AD", "s1", "a")],
                6,
            );
            let found = discover(dir.path(), &DiscoveryConfig::default()).unwrap();
            assert_eq!(built, found);
        }
    }
}
