use std::{fs, time::Duration};

use assert_cmd::Command;
use predicates::{boolean::PredicateBooleanExt, str::contains};
use tempfile::tempdir;

fn hearth(dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("hearth"));
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env_remove("RUST_LOG")
        .timeout(Duration::from_secs(20));
    cmd
}

#[test]
fn help_lists_options_and_exits_with_usage_code() {
    let temp = tempdir().expect("failed to create tempdir");
    hearth(temp.path())
        .arg("--help")
        .assert()
        .code(1)
        .stdout(contains("--norestore"))
        .stdout(contains("--debugbufferswitches"))
        .stdout(contains("--raise-fault").not());
}

#[test]
fn version_exits_zero() {
    let temp = tempdir().expect("failed to create tempdir");
    hearth(temp.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let temp = tempdir().expect("failed to create tempdir");
    hearth(temp.path())
        .arg("--frobnicate")
        .assert()
        .code(1)
        .stderr(contains("--frobnicate"));
}

#[test]
fn service_flag_in_interactive_mode_is_rejected() {
    let temp = tempdir().expect("failed to create tempdir");
    hearth(temp.path())
        .args(["--mode", "interactive", "--port", "5000"])
        .assert()
        .code(1)
        .stderr(contains("'--port' is not available in interactive mode"))
        .stderr(contains("Usage"));
}

#[test]
fn frontend_flag_in_service_mode_is_rejected() {
    let temp = tempdir().expect("failed to create tempdir");
    hearth(temp.path())
        .args(["-m", "core", "--debugmodel"])
        .assert()
        .code(1)
        .stderr(contains("not available in service mode"));
}

#[test]
fn missing_settings_file_is_a_usage_error() {
    let temp = tempdir().expect("failed to create tempdir");
    hearth(temp.path())
        .args(["--config", "missing.yaml"])
        .assert()
        .code(1)
        .stderr(contains("missing.yaml"));
}

#[test]
fn settings_file_selects_mode() {
    let temp = tempdir().expect("failed to create tempdir");
    let data = temp.path().join("data");
    let config = temp.path().join("hearth.yaml");
    fs::write(
        &config,
        format!("mode: client\ndata_dir: {}\ntick_ms: 10\n", data.display()),
    )
    .expect("failed to write settings");

    hearth(temp.path())
        .arg("--config")
        .arg(&config)
        .write_stdin("quit\n")
        .assert()
        .success()
        .stdout(contains("interactive mode"));

    assert!(data.join("frontend-session.json").exists());
}
