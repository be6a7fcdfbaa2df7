//! CSV manifest generation.

use chrono::NaiveDateTime;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::config::SplitPlan;
use super::error::SplitError;

const HEADER: [&str; 4] = ["split", "label", "num_scans", "scan1"];
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// One manifest partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

/// One manifest row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub split: Split,
    pub label: u8,
    pub num_scans: u32,
    pub scan1: PathBuf,
}

/// Files written by [`generate_manifests`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestPaths {
    pub train: PathBuf,
    pub val: PathBuf,
    pub test: PathBuf,
    /// Concatenation of train, val and test.
    pub all: PathBuf,
    /// Rows per split, in train, val, test order.
    pub counts: [usize; 3],
}

/// Writes train, validation, test and combined manifests for the dataset at
/// `root`.
///
/// Entries are the immediate children of `<root>/<class>/` for every class
/// in `plan.labels`. Each class is sorted, shuffled with `plan.seed`, and cut
/// at `floor(n * train / 100)` and `floor(n * (train + valid) / 100)`.
/// Splits concatenate classes in label-map order. The plan is validated
/// before anything is read or written.
pub fn generate_manifests(
    root: &Path,
    plan: &SplitPlan,
    output_dir: &Path,
    timestamp: NaiveDateTime,
) -> Result<ManifestPaths, SplitError> {
    plan.validate()?;

    if !root.is_dir() {
        return Err(SplitError::RootNotFound {
            path: root.to_path_buf(),
        });
    }

    let mut rng = StdRng::seed_from_u64(plan.seed);
    let mut splits: [Vec<ManifestEntry>; 3] = [Vec::new(), Vec::new(), Vec::new()];

    for (class, &label) in &plan.labels {
        let mut entries = class_entries(root, class)?;
        entries.sort();
        entries.shuffle(&mut rng);

        let (n_train, n_val_end) = plan.boundaries(entries.len());
        tracing::info!(
            class = %class,
            total = entries.len(),
            train = n_train,
            val = n_val_end - n_train,
            test = entries.len() - n_val_end,
            "Split class"
        );

        for (idx, scan1) in entries.into_iter().enumerate() {
            let split = if idx < n_train {
                Split::Train
            } else if idx < n_val_end {
                Split::Val
            } else {
                Split::Test
            };
            splits[split_index(split)].push(ManifestEntry {
                split,
                label,
                num_scans: 1,
                scan1,
            });
        }
    }

    std::fs::create_dir_all(output_dir).map_err(|source| SplitError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let dataset = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "dataset".to_string());
    let stamp = timestamp.format(TIMESTAMP_FORMAT).to_string();
    let file_for = |name: &str| output_dir.join(format!("{}_{}_{}_dataset.csv", dataset, name, stamp));

    let train = file_for(Split::Train.as_str());
    let val = file_for(Split::Val.as_str());
    let test = file_for(Split::Test.as_str());
    let all = file_for("all");

    for (split, path) in Split::ALL.into_iter().zip([&train, &val, &test]) {
        write_manifest(path, splits[split_index(split)].iter())?;
        tracing::info!("Saved {}", path.display());
    }
    write_manifest(&all, splits.iter().flatten())?;
    tracing::info!("Saved {}", all.display());

    Ok(ManifestPaths {
        train,
        val,
        test,
        all,
        counts: [splits[0].len(), splits[1].len(), splits[2].len()],
    })
}

fn split_index(split: Split) -> usize {
    match split {
        Split::Train => 0,
        Split::Val => 1,
        Split::Test => 2,
    }
}

/// Immediate, non-hidden children of `<root>/<class>/`.
fn class_entries(root: &Path, class: &str) -> Result<Vec<PathBuf>, SplitError> {
    let dir = root.join(class);
    let read_dir = match std::fs::read_dir(&dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Class directory {} not found, no entries", dir.display());
            return Ok(Vec::new());
        }
        Err(source) => return Err(SplitError::Io { path: dir, source }),
    };

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| SplitError::Io {
            path: dir.clone(),
            source,
        })?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        entries.push(entry.path());
    }
    Ok(entries)
}

fn write_manifest<'a>(
    path: &Path,
    entries: impl Iterator<Item = &'a ManifestEntry>,
) -> Result<(), SplitError> {
    let csv_err = |source| SplitError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_err)?;
    writer.write_record(HEADER).map_err(csv_err)?;
    for entry in entries {
        writer.serialize(entry).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| SplitError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Reads a manifest back into entries.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>, SplitError> {
    let csv_err = |source| SplitError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    reader
        .deserialize()
        .collect::<Result<Vec<ManifestEntry>, _>>()
        .map_err(csv_err)
}
