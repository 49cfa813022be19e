use assert_cmd::Command;
use predicates::prelude::*;
use std::collections::BTreeSet;
use std::path::Path;

/// Check if running as root
fn is_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

fn tandem() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tandem"))
}

#[test]
fn test_help_command() {
    tandem()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("share selected namespaces"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("share"))
        .stdout(predicate::str::contains("namespaces"));
}

#[test]
fn test_version_command() {
    tandem()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tandem"));
}

#[test]
fn test_invalid_command() {
    tandem()
        .arg("invalid")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_share_help_lists_defaults() {
    tandem()
        .args(["share", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--rootfs"))
        .stdout(predicate::str::contains("integration/test2"));
}

#[test]
fn test_share_requires_root() {
    if is_root() {
        eprintln!("Skipping test: running as root");
        return;
    }

    tandem()
        .arg("share")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Must run as root"));
}

#[test]
fn test_namespaces_current_process() {
    tandem()
        .arg("namespaces")
        .assert()
        .success()
        .stdout(predicate::str::contains("Namespace Information"))
        .stdout(predicate::str::contains("NET:"));
}

#[test]
fn test_namespaces_missing_process() {
    tandem()
        .args(["namespaces", "--pid", "2147483647"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to get namespace information"));
}

#[test]
#[ignore] // Requires root
fn test_share_workflow() {
    if !is_root() {
        eprintln!("Skipping test: requires root");
        return;
    }

    tandem()
        .arg("share")
        .assert()
        .success()
        .stdout(predicate::str::contains("namespace_paths"))
        .stdout(predicate::str::contains("testCT2"))
        .stdout(predicate::str::contains("shared, all others separate"));
}

/// Child groups of a cgroup directory, empty if it does not exist
fn cgroup_entries(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

#[test]
#[ignore] // Requires root and a cgroup v2 hierarchy
fn test_share_failure_releases_cgroups() {
    if !is_root() {
        eprintln!("Skipping test: requires root");
        return;
    }

    let groups = Path::new("/sys/fs/cgroup/tandem");
    let before = cgroup_entries(groups);

    tandem()
        .args(["share", "--cgroup-path", "integration/leak-check", "--"])
        .arg("/nonexistent/program")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to run"));

    assert_eq!(cgroup_entries(groups), before);
    assert!(!Path::new("/sys/fs/cgroup/integration/leak-check").exists());
}
