use regex_lite::Regex;
use std::path::PathBuf;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Pipeline: workers and stage timeout are positive
/// - Discovery: depth is at least class/subject/file and the pattern compiles
/// - Stage parameters are within the ranges the tools accept
/// - Source and target roots differ and are not nested
/// - Split percentages and labels
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

    // Pipeline validation
    if config.pipeline.workers == 0 {
        return invalid("pipeline.workers must be at least 1".to_string());
    }
    if config.pipeline.stage_timeout_secs == 0 {
        return invalid("pipeline.stage_timeout_secs must be at least 1".to_string());
    }

    // Discovery validation
    if config.discovery.scan_depth < 3 {
        return invalid(format!(
            "discovery.scan_depth must be at least 3, got {}",
            config.discovery.scan_depth
        ));
    }
    if let Err(e) = Regex::new(&config.discovery.scan_pattern) {
        return invalid(format!("discovery.scan_pattern is not a valid regex: {}", e));
    }

    // Stage parameters
    let stages = &config.stages;
    if !(stages.bet_fraction > 0.0 && stages.bet_fraction < 1.0) {
        return invalid(format!(
            "stages.bet_fraction must be in (0, 1), got {}",
            stages.bet_fraction
        ));
    }
    if !(-1.0..=1.0).contains(&stages.bet_gradient) {
        return invalid(format!(
            "stages.bet_gradient must be in [-1, 1], got {}",
            stages.bet_gradient
        ));
    }
    if ![6, 7, 9, 12].contains(&stages.flirt_dof) {
        return invalid(format!(
            "stages.flirt_dof must be one of 6, 7, 9, 12, got {}",
            stages.flirt_dof
        ));
    }
    if stages.flirt_bins == 0 {
        return invalid("stages.flirt_bins must be at least 1".to_string());
    }
    if ![2, 3, 4].contains(&stages.n4_dimension) {
        return invalid(format!(
            "stages.n4_dimension must be 2, 3 or 4, got {}",
            stages.n4_dimension
        ));
    }

    if let (Some(source), Some(target)) = (&config.source_root, &config.target_root) {
        if source == target {
            return invalid(format!(
                "source_root and target_root must differ: {}",
                source.display()
            ));
        }
        // Artifacts inside the source tree would be picked up by discovery on the next run.
        if target.starts_with(source) || source.starts_with(target) {
            return invalid(format!(
                "source_root and target_root must not be nested: {} and {}",
                source.display(),
                target.display()
            ));
        }
    }

    // Split validation
    config
        .split
        .validate()
        .map_err(|e| ConfigError::ValidationError(format!("split: {}", e)))?;

    Ok(())
}

/// Roots and reference needed by the preprocess command.
///
/// Returns `(source_root, target_root)`.
pub fn require_preprocess_inputs(config: &Config) -> Result<(PathBuf, PathBuf), ConfigError> {
    let source = config.source_root.clone().ok_or_else(|| {
        ConfigError::ValidationError("source_root is required (--source)".to_string())
    })?;
    let target = config.target_root.clone().ok_or_else(|| {
        ConfigError::ValidationError("target_root is required (--target)".to_string())
    })?;
    if !config.tools.has_reference() {
        return Err(ConfigError::ValidationError(
            "tools.reference is required (--reference)".to_string(),
        ));
    }
    Ok((source, target))
}
