//! Filesystem walk that turns a source tree into scans.

use glob::{glob_with, MatchOptions, Pattern};
use regex_lite::Regex;
use std::collections::HashMap;
use std::path::{Component, Path};

use super::error::DiscoveryError;
use super::types::{DiscoveryConfig, Scan};

/// Enumerates every scan under `root`, sorted by source path.
///
/// Layout is `<root>/<class>/<subject>/.../<scan file>` with scan files at
/// exactly `config.scan_depth` components below `root`. Any file matching
/// `config.scan_pattern` at another depth fails the whole discovery with
/// [`DiscoveryError::MalformedLayout`] instead of being skipped. Files that
/// do not match the pattern and hidden entries are ignored. An empty tree is
/// not an error.
pub fn discover(root: &Path, config: &DiscoveryConfig) -> Result<Vec<Scan>, DiscoveryError> {
    match std::fs::metadata(root) {
        Ok(meta) if !meta.is_dir() => {
            return Err(DiscoveryError::NotADirectory {
                path: root.to_path_buf(),
            })
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DiscoveryError::RootNotFound {
                path: root.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(DiscoveryError::Unreadable {
                path: root.to_path_buf(),
                source: e,
            })
        }
    }

    let scan_pattern =
        Regex::new(&config.scan_pattern).map_err(|e| DiscoveryError::InvalidPattern {
            pattern: config.scan_pattern.clone(),
            reason: e.to_string(),
        })?;

    let walk_pattern = format!("{}/**/*", Pattern::escape(&root.to_string_lossy()));
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };
    let entries = glob_with(&walk_pattern, options).map_err(|e| DiscoveryError::InvalidPattern {
        pattern: walk_pattern.clone(),
        reason: e.to_string(),
    })?;

    let mut scans = Vec::new();
    let mut offenders = Vec::new();

    for entry in entries {
        let path = entry.map_err(|e| DiscoveryError::Unreadable {
            path: e.path().to_path_buf(),
            source: e.into_error(),
        })?;

        if path.is_dir() {
            continue;
        }

        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        if is_hidden(relative) {
            continue;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !scan_pattern.is_match(&file_name) {
            tracing::trace!(path = %path.display(), "Skipping non-scan file");
            continue;
        }

        let depth = relative.components().count();
        if depth != config.scan_depth {
            offenders.push(path);
            continue;
        }

        match Scan::from_path(root, &path) {
            Some(scan) => scans.push(scan),
            None => offenders.push(path),
        }
    }

    if !offenders.is_empty() {
        offenders.sort();
        return Err(DiscoveryError::MalformedLayout {
            expected_depth: config.scan_depth,
            offenders,
        });
    }

    scans.sort_by(|a, b| a.source_path().cmp(b.source_path()));
    check_unique(&scans)?;

    tracing::info!(
        "Discovered {} scans under {}",
        scans.len(),
        root.display()
    );

    Ok(scans)
}

fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

/// Each scan must own a disjoint artifact namespace.
fn check_unique(scans: &[Scan]) -> Result<(), DiscoveryError> {
    let mut seen: HashMap<(&str, &str), &Path> = HashMap::new();
    for scan in scans {
        let key = (scan.subject_id(), scan.base_name());
        if let Some(first) = seen.get(&key) {
            return Err(DiscoveryError::DuplicateScan {
                subject_id: scan.subject_id().to_string(),
                base_name: scan.base_name().to_string(),
                first: first.to_path_buf(),
                second: scan.source_path().to_path_buf(),
            });
        }
        seen.insert(key, scan.source_path());
    }
    Ok(())
}
