#[path = "common/mod.rs"]
mod common;

use std::{fs, time::Duration};

use assert_cmd::Command;
use common::{send_signal, spawn_hearth, wait_for_contents, wait_for_exit};
use nix::sys::signal::Signal;
use predicates::str::contains;
use tempfile::tempdir;

#[test]
fn service_mode_saves_state_once_on_sigint() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let log = dir.join("hearth.log");
    let data = dir.join("data");

    let mut child = spawn_hearth(
        dir,
        &[
            "-m",
            "service",
            "-p",
            "0",
            "--datadir",
            data.to_str().unwrap(),
            "-l",
            log.to_str().unwrap(),
        ],
    );

    let content = wait_for_contents(&log, "Entering main loop in service mode");
    assert!(content.contains("No saved state"), "log:\n{content}");

    send_signal(&child, Signal::SIGINT);
    send_signal(&child, Signal::SIGINT);

    let status = wait_for_exit(&mut child);
    assert_eq!(status.code(), Some(0));

    let content = fs::read_to_string(&log).expect("failed to read log");
    assert!(content.contains("Caught signal 2 - exiting."), "log:\n{content}");
    assert_eq!(content.matches("Saved service state").count(), 1);
    assert!(data.join("state.json").exists());
}

#[test]
fn restart_restores_saved_state() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let data = dir.join("data");
    let args = |log: &str| {
        vec![
            "-m".to_string(),
            "service".to_string(),
            "-p".to_string(),
            "0".to_string(),
            "--datadir".to_string(),
            data.display().to_string(),
            "-l".to_string(),
            dir.join(log).display().to_string(),
        ]
    };

    for (round, log) in ["first.log", "second.log"].into_iter().enumerate() {
        let argv = args(log);
        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
        let mut child = spawn_hearth(dir, &argv);

        let content = wait_for_contents(&dir.join(log), "Entering main loop");
        if round == 1 {
            assert!(content.contains("Restored 0 session(s)"), "log:\n{content}");
        }

        send_signal(&child, Signal::SIGTERM);
        assert_eq!(wait_for_exit(&mut child).code(), Some(0));
    }
}

#[test]
fn norestore_skips_state() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let log = dir.join("hearth.log");

    let mut child = spawn_hearth(
        dir,
        &[
            "--mode",
            "service",
            "--port",
            "0",
            "--norestore",
            "--datadir",
            dir.join("data").to_str().unwrap(),
            "--logfile",
            log.to_str().unwrap(),
        ],
    );

    let content = wait_for_contents(&log, "Entering main loop");
    assert!(content.contains("Not restoring service state"), "log:\n{content}");

    send_signal(&child, Signal::SIGTERM);
    assert_eq!(wait_for_exit(&mut child).code(), Some(0));
}

#[test]
fn unwritable_log_file_falls_back_to_stderr() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let log = dir.join("missing/hearth.log");

    let mut child = spawn_hearth(
        dir,
        &[
            "-m",
            "combined",
            "-p",
            "0",
            "-n",
            "--datadir",
            dir.join("data").to_str().unwrap(),
            "-l",
            log.to_str().unwrap(),
        ],
    );

    // Closing stdin ends the console session.
    drop(child.stdin.take());
    let output = child.wait_with_output().expect("failed to collect output");
    assert_eq!(output.status.code(), Some(0));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Couldn't open logfile"),
        "stderr:\n{stderr}"
    );
    assert!(stderr.contains("will log to stderr instead"), "stderr:\n{stderr}");
    assert!(!log.exists());
}

#[test]
fn combined_mode_stops_on_sigterm_and_saves() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let log = dir.join("hearth.log");
    let data = dir.join("data");

    let mut child = spawn_hearth(
        dir,
        &[
            "-m",
            "combined",
            "-p",
            "0",
            "-L",
            "debug",
            "--datadir",
            data.to_str().unwrap(),
            "-l",
            log.to_str().unwrap(),
        ],
    );

    wait_for_contents(&log, "No previous front end session");
    send_signal(&child, Signal::SIGTERM);

    let output = child.wait_with_output().expect("failed to collect output");
    assert_eq!(output.status.code(), Some(0));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("combined mode"), "stdout:\n{stdout}");
    assert!(stdout.contains("service listening on"), "stdout:\n{stdout}");
    assert!(data.join("state.json").exists());
    assert!(data.join("frontend-session.json").exists());
}

#[test]
fn interactive_mode_answers_commands_and_quits() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();

    Command::new(assert_cmd::cargo::cargo_bin!("hearth"))
        .args(["-m", "interactive"])
        .current_dir(dir)
        .env("HOME", dir)
        .write_stdin("status\nhelp\nquit\n")
        .timeout(Duration::from_secs(20))
        .assert()
        .success()
        .stdout(contains("no local service in this process"))
        .stdout(contains("commands: status, help, quit"));

    let session = dir.join(".local/share/hearth/frontend-session.json");
    let content = fs::read_to_string(&session).expect("session file missing");
    assert!(content.contains("\"last_view\": \"help\""), "{content}");
}

#[test]
fn interactive_mode_exits_zero_on_eof() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();

    Command::new(assert_cmd::cargo::cargo_bin!("hearth"))
        .args(["--mode", "interactive"])
        .current_dir(dir)
        .env("HOME", dir)
        .write_stdin("")
        .timeout(Duration::from_secs(20))
        .assert()
        .success();
}
