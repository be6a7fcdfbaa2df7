use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::{Path, PathBuf};

use super::{types::Config, ConfigError};

/// Prefix of environment variables that override configuration values.
pub const ENV_PREFIX: &str = "NEUROPREP_";

/// Values supplied on the command line. They take precedence over the file
/// and the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source_root: Option<PathBuf>,
    pub target_root: Option<PathBuf>,
    pub flirt: Option<PathBuf>,
    pub reference: Option<PathBuf>,
    pub delete_intermediates: Option<bool>,
    pub workers: Option<usize>,
    pub stage_timeout_secs: Option<u64>,
    pub split_train: Option<u32>,
    pub split_valid: Option<u32>,
    pub split_test: Option<u32>,
    pub split_seed: Option<u64>,
    pub split_output_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    fn apply(&self, mut figment: Figment) -> Figment {
        fn set<T: serde::Serialize>(figment: Figment, key: &str, value: &Option<T>) -> Figment {
            match value {
                Some(value) => figment.merge(Serialized::default(key, value)),
                None => figment,
            }
        }

        figment = set(figment, "source_root", &self.source_root);
        figment = set(figment, "target_root", &self.target_root);
        figment = set(figment, "tools.flirt", &self.flirt);
        figment = set(figment, "tools.reference", &self.reference);
        figment = set(figment, "pipeline.delete_intermediates", &self.delete_intermediates);
        figment = set(figment, "pipeline.workers", &self.workers);
        figment = set(figment, "pipeline.stage_timeout_secs", &self.stage_timeout_secs);
        figment = set(figment, "split.train", &self.split_train);
        figment = set(figment, "split.valid", &self.split_valid);
        figment = set(figment, "split.test", &self.split_test);
        figment = set(figment, "split.seed", &self.split_seed);
        figment = set(figment, "split.output_dir", &self.split_output_dir);
        figment
    }
}

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    load_config_with_overrides(Some(path), &ConfigOverrides::default())
}

/// Load configuration from an optional file, the environment, and
/// command-line overrides, in increasing order of precedence.
///
/// A `path` that does not exist is an error; pass `None` to run on defaults.
pub fn load_config_with_overrides(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<Config, ConfigError> {
    let mut figment = Figment::new();
    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        figment = figment.merge(Toml::file(path));
    }
    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
    figment = overrides.apply(figment);

    let config: Config = figment
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
source_root = "/data/in"

[pipeline]
workers = 3
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.pipeline.workers, 3);
        assert_eq!(config.source_root, Some(PathBuf::from("/data/in")));
    }

    #[test]
    fn test_load_config_from_str_bad_enum() {
        let toml = r#"
[stages]
flirt_cost = "fancy"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/neuroprep.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
target_root = "/data/out"

[tools]
reference = "/atlas/mni.nii.gz"

[discovery]
scan_depth = 4
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.target_root, Some(PathBuf::from("/data/out")));
        assert_eq!(config.discovery.scan_depth, 4);
        assert_eq!(config.tools.reference, PathBuf::from("/atlas/mni.nii.gz"));
    }

    #[test]
    fn test_overrides_take_precedence_over_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
source_root = "/from/file"

[pipeline]
workers = 8
delete_intermediates = false

[split]
train = 80
valid = 10
test = 10
"#
        )
        .unwrap();

        let overrides = ConfigOverrides {
            source_root: Some(PathBuf::from("/from/cli")),
            workers: Some(2),
            delete_intermediates: Some(true),
            flirt: Some(PathBuf::from("/opt/fsl/bin/flirt")),
            split_train: Some(70),
            split_valid: Some(15),
            split_test: Some(15),
            ..Default::default()
        };
        let config = load_config_with_overrides(Some(temp_file.path()), &overrides).unwrap();
        assert_eq!(config.source_root, Some(PathBuf::from("/from/cli")));
        assert_eq!(config.pipeline.workers, 2);
        assert!(config.pipeline.delete_intermediates);
        assert_eq!(config.tools.flirt, PathBuf::from("/opt/fsl/bin/flirt"));
        assert_eq!(config.tools.bet, PathBuf::from("bet"));
        assert_eq!(
            (config.split.train, config.split.valid, config.split.test),
            (70, 15, 15)
        );
    }

    #[test]
    fn test_defaults_without_file() {
        let config = load_config_with_overrides(None, &ConfigOverrides::default()).unwrap();
        assert_eq!(config.discovery.scan_depth, 6);
        assert_eq!(config.split.labels.get("AD"), Some(&1));
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[stages]\nflirt_bins = 128").unwrap();

        std::env::set_var("NEUROPREP_STAGES__FLIRT_BINS", "64");
        let config = load_config(temp_file.path());
        std::env::remove_var("NEUROPREP_STAGES__FLIRT_BINS");

        assert_eq!(config.unwrap().stages.flirt_bins, 64);
    }
}
