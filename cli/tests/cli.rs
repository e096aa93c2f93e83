use std::process::Command;

use assert_cmd::cargo::cargo_bin;
use predicates::prelude::*;

#[test]
fn version_flag_prints_and_exits_zero() {
    let mut cmd = Command::new(cargo_bin("minicoder"));
    cmd.arg("--version");
    let assert = cmd.assert().success();
    assert
        .stdout(predicate::str::contains("minicoder"));
}

#[test]
fn help_flag_lists_known_options() {
    let mut cmd = Command::new(cargo_bin("minicoder"));
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--max-iterations"))
        .stdout(predicate::str::contains("--focus"));
}

/// Invokes the binary through a symlink named `agent-done`, the way a
/// generated script does when it runs a command from the sandbox `PATH`.
/// This exercises the real `argv[0]` dispatch path end to end, rather than
/// just the pure helpers in `minicoder_core::agent_command`.
#[test]
fn agent_done_dispatch_via_argv0_updates_state_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let link_path = dir.path().join("agent-done");
    std::os::unix::fs::symlink(cargo_bin("minicoder"), &link_path).expect("symlink");

    let state_path = dir.path().join("state.json");
    std::fs::write(&state_path, "{}").expect("seed state file");

    let status = Command::new(&link_path)
        .env("MINICODER_STATE_FILE", &state_path)
        .status()
        .expect("run agent-done");
    assert!(status.success());

    let content = std::fs::read_to_string(&state_path).expect("read state file");
    assert!(content.contains("\"done\":true"));
}

/// Same dispatch path as `agent_done_dispatch_via_argv0_updates_state_file`,
/// but for `agent-cd`, whose handler canonicalizes its argument against the
/// real filesystem.
#[test]
fn agent_cd_dispatch_via_argv0_updates_working_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let link_path = dir.path().join("agent-cd");
    std::os::unix::fs::symlink(cargo_bin("minicoder"), &link_path).expect("symlink");

    let target = dir.path().join("target-dir");
    std::fs::create_dir(&target).expect("create target dir");

    let state_path = dir.path().join("state.json");
    std::fs::write(&state_path, "{}").expect("seed state file");

    let status = Command::new(&link_path)
        .arg(&target)
        .env("MINICODER_STATE_FILE", &state_path)
        .status()
        .expect("run agent-cd");
    assert!(status.success());

    let content = std::fs::read_to_string(&state_path).expect("read state file");
    let resolved = std::fs::canonicalize(&target).expect("canonicalize target");
    assert!(content.contains(resolved.to_string_lossy().as_ref()));
}

#[test]
fn agent_command_without_state_file_env_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let link_path = dir.path().join("agent-abort");
    std::os::unix::fs::symlink(cargo_bin("minicoder"), &link_path).expect("symlink");

    let status = Command::new(&link_path)
        .env_remove("MINICODER_STATE_FILE")
        .status()
        .expect("run agent-abort");
    assert!(!status.success());
}
