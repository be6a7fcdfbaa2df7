//! End-to-end tests of the `neuroprep` binary with shell-script stand-ins
//! for the neuroimaging tools.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use neuroprep_core::testing::fixtures;
use tempfile::TempDir;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

struct Workspace {
    dir: TempDir,
    source: PathBuf,
    target: PathBuf,
    config: PathBuf,
}

impl Workspace {
    /// Source tree with scans at depth 4, fake tools, and a config file
    /// pointing at them. `bet` fails for any scan whose base name is "bad".
    fn new(entries: &[(&str, &str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("ADNI");
        let target = dir.path().join("processed");
        fixtures::build_source_tree(&source, entries, 4);

        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let robustfov = write_script(&bin, "robustfov", r#"cp "$2" "$4""#);
        let n4 = write_script(&bin, "N4BiasFieldCorrection", r#"cp "$4" "$6""#);
        let bet = write_script(
            &bin,
            "bet",
            "case \"$1\" in */bad_*) echo 'bet: image exception' >&2; exit 1;; esac\ncp \"$1\" \"$2\"",
        );
        let reorient = write_script(&bin, "fslreorient2std", r#"cp "$1" "$2""#);
        let flirt = write_script(&bin, "flirt", r#"cp "$2" "$6""#);
        let reference = dir.path().join("MNI152_T1_1mm_brain.nii.gz");
        std::fs::write(&reference, b"atlas").unwrap();

        let config = dir.path().join("neuroprep.toml");
        std::fs::write(
            &config,
            format!(
                r#"
[discovery]
scan_depth = 4

[pipeline]
workers = 2

[tools]
robustfov = "{}"
n4 = "{}"
bet = "{}"
fslreorient2std = "{}"
flirt = "{}"
reference = "{}"
"#,
                robustfov.display(),
                n4.display(),
                bet.display(),
                reorient.display(),
                flirt.display(),
                reference.display()
            ),
        )
        .unwrap();

        Self {
            dir,
            source,
            target,
            config,
        }
    }

    fn neuroprep(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_neuroprep"))
            .current_dir(self.dir.path())
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .output()
            .unwrap()
    }

    fn preprocess(&self, extra: &[&str]) -> Output {
        let mut args = vec![
            "-p".to_string(),
            self.source.display().to_string(),
            "-t".to_string(),
            self.target.display().to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.neuroprep(&args)
    }

    fn summary(&self, path: &Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }
}

#[test]
fn test_preprocess_produces_every_artifact() {
    let ws = Workspace::new(&[("AD", "s1", "I1"), ("NC", "s2", "I2")]);
    let out = ws.preprocess(&[]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    for (subject, base) in [("s1", "I1"), ("s2", "I2")] {
        for suffix in ["cropped", "n4bias", "stripped", "reoriented", "registered"] {
            let path = ws
                .target
                .join(subject)
                .join(format!("{}_{}.nii.gz", base, suffix));
            assert!(path.exists(), "missing {}", path.display());
        }
    }
}

#[test]
fn test_failure_is_isolated_and_strict_sets_exit_status() {
    let ws = Workspace::new(&[("AD", "s1", "good"), ("AD", "s2", "bad")]);
    let summary_path = ws.dir.path().join("summary.json");
    let summary_arg = summary_path.display().to_string();

    let out = ws.preprocess(&["--summary", &summary_arg]);
    assert!(out.status.success());

    let report = ws.summary(&summary_path);
    assert_eq!(report["summary"]["completed"], 1);
    assert_eq!(report["summary"]["failed"], 1);
    assert_eq!(report["summary"]["failures"][0]["scan"], "s2/bad");
    assert_eq!(report["summary"]["failures"][0]["stage"], "skull_strip");
    assert!(ws.target.join("s1/good_registered.nii.gz").exists());
    assert!(!ws.target.join("s2/bad_registered.nii.gz").exists());

    let strict = ws.preprocess(&["--strict"]);
    assert!(!strict.status.success());
}

#[test]
fn test_target_inside_source_is_rejected() {
    let ws = Workspace::new(&[("AD", "s1", "I1")]);
    let nested = ws.source.join("processed");
    let nested_arg = nested.display().to_string();
    let source_arg = ws.source.display().to_string();

    let out = ws.neuroprep(&["-p", &source_arg, "-t", &nested_arg]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("must not be nested"));
    assert!(!nested.exists());
}

#[test]
fn test_second_run_resumes_everything() {
    let ws = Workspace::new(&[("AD", "s1", "I1"), ("NC", "s2", "I2")]);
    assert!(ws.preprocess(&[]).status.success());

    let summary_path = ws.dir.path().join("second.json");
    let summary_arg = summary_path.display().to_string();
    let out = ws.preprocess(&["--summary", &summary_arg]);
    assert!(out.status.success());

    let report = ws.summary(&summary_path);
    assert_eq!(report["summary"]["total"], 2);
    assert_eq!(report["summary"]["resumed"], 2);
}

#[test]
fn test_delete_intermediates_keeps_final_only() {
    let ws = Workspace::new(&[("AD", "s1", "I1")]);
    let out = ws.preprocess(&["-n", "-c", "1"]);
    assert!(out.status.success());

    let remaining: Vec<PathBuf> = std::fs::read_dir(ws.target.join("s1"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(remaining, vec![ws.target.join("s1/I1_registered.nii.gz")]);
}

#[test]
fn test_metrics_written() {
    let ws = Workspace::new(&[("AD", "s1", "I1")]);
    let metrics_path = ws.dir.path().join("metrics.prom");
    let metrics_arg = metrics_path.display().to_string();
    assert!(ws.preprocess(&["--metrics-out", &metrics_arg]).status.success());

    let text = std::fs::read_to_string(&metrics_path).unwrap();
    assert!(text.contains("neuroprep_stage_invocations_total"));
    assert!(text.contains("neuroprep_scans_total"));
}

#[test]
fn test_discover_lists_scans_and_rejects_bad_layout() {
    let ws = Workspace::new(&[("AD", "s1", "I1"), ("NC", "s2", "I2")]);
    let source = ws.source.display().to_string();

    let out = ws.neuroprep(&["discover", "-p", &source]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout.lines().count(), 2);
    assert!(stdout.lines().next().unwrap().starts_with("AD\ts1\tI1\t"));

    std::fs::write(ws.source.join("AD/s1/stray.nii"), b"x").unwrap();
    let out = ws.neuroprep(&["discover", "-p", &source]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("malformed layout"));
}

#[test]
fn test_split_rejects_bad_percentages_before_writing() {
    let ws = Workspace::new(&[]);
    let root = ws.dir.path().join("dataset");
    fixtures::build_class_entries(&root, "AD", 5);
    let root_arg = root.display().to_string();
    let output = ws.dir.path().join("manifests");
    let output_arg = output.display().to_string();

    let out = ws.neuroprep(&[
        "split", "--root", &root_arg, "--train", "70", "--valid", "15", "--test", "10",
        "--output", &output_arg,
    ]);
    assert!(!out.status.success());
    assert!(!output.exists());

    let out = ws.neuroprep(&["split", "--root", &root_arg, "--output", &output_arg]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let files = std::fs::read_dir(&output).unwrap().count();
    assert_eq!(files, 4);
}

#[test]
fn test_generate_config_refuses_overwrite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sample.toml");
    let path_arg = path.display().to_string();
    let run = |extra: &[&str]| {
        Command::new(env!("CARGO_BIN_EXE_neuroprep"))
            .current_dir(dir.path())
            .args(["generate-config", "--output", &path_arg])
            .args(extra)
            .output()
            .unwrap()
    };

    assert!(run(&[]).status.success());
    assert!(std::fs::read_to_string(&path).unwrap().contains("[pipeline]"));
    assert!(!run(&[]).status.success());
    assert!(run(&["--force"]).status.success());
}
