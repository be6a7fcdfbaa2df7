//! Configuration for the split module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::error::SplitConfigError;

/// How entries are divided into train, validation and test manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPlan {
    /// Training share in percent.
    #[serde(default = "default_train")]
    pub train: u32,

    /// Validation share in percent.
    #[serde(default = "default_valid")]
    pub valid: u32,

    /// Test share in percent.
    #[serde(default = "default_test")]
    pub test: u32,

    /// Seed of the shuffle applied before splitting.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Directory manifests are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Class directory name to numeric label. Iteration order is the order
    /// classes are concatenated in each split.
    #[serde(default = "default_labels")]
    pub labels: BTreeMap<String, u8>,
}

fn default_train() -> u32 {
    70
}

fn default_valid() -> u32 {
    15
}

fn default_test() -> u32 {
    15
}

fn default_seed() -> u64 {
    42
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("manifests")
}

fn default_labels() -> BTreeMap<String, u8> {
    BTreeMap::from([("AD".to_string(), 1), ("NC".to_string(), 0)])
}

impl Default for SplitPlan {
    fn default() -> Self {
        Self {
            train: default_train(),
            valid: default_valid(),
            test: default_test(),
            seed: default_seed(),
            output_dir: default_output_dir(),
            labels: default_labels(),
        }
    }
}

impl SplitPlan {
    /// Sets the three percentages.
    pub fn with_percentages(mut self, train: u32, valid: u32, test: u32) -> Self {
        self.train = train;
        self.valid = valid;
        self.test = test;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks the plan without touching the filesystem.
    pub fn validate(&self) -> Result<(), SplitConfigError> {
        let sum = u64::from(self.train) + u64::from(self.valid) + u64::from(self.test);
        if sum != 100 {
            return Err(SplitConfigError::PercentagesSum {
                train: self.train,
                valid: self.valid,
                test: self.test,
                sum,
            });
        }
        if self.labels.is_empty() {
            return Err(SplitConfigError::NoClasses);
        }
        for (class, &label) in &self.labels {
            if label > 1 {
                return Err(SplitConfigError::InvalidLabel {
                    class: class.clone(),
                    label,
                });
            }
        }
        Ok(())
    }

    /// `(n_train, n_val_end)` for a class with `n` entries.
    pub(crate) fn boundaries(&self, n: usize) -> (usize, usize) {
        let n = n as u64;
        let n_train = n * u64::from(self.train) / 100;
        let n_val_end = n * (u64::from(self.train) + u64::from(self.valid)) / 100;
        (n_train as usize, n_val_end as usize)
    }
}
