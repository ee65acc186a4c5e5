#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use hearth::crash::CrashReporter;
use nix::{
    sys::signal::{Signal, kill},
    unistd::Pid,
};

/// Starts the binary in `dir` with `HOME` pointing into it.
pub fn spawn_hearth(dir: &Path, args: &[&str]) -> Child {
    Command::new(assert_cmd::cargo::cargo_bin!("hearth"))
        .args(args)
        .current_dir(dir)
        .env("HOME", dir)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn hearth")
}

pub fn send_signal(child: &Child, signal: Signal) {
    let _ = kill(Pid::from_raw(child.id() as i32), signal);
}

pub fn wait_for_contents(path: &Path, needle: &str) -> String {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(content) = fs::read_to_string(path)
            && content.contains(needle)
        {
            return content;
        }

        if Instant::now() >= deadline {
            let content = fs::read_to_string(path).unwrap_or_default();
            panic!("Timed out waiting for '{needle}' in {:?}:\n{content}", path);
        }

        thread::sleep(Duration::from_millis(50));
    }
}

pub fn wait_for_exit(child: &mut Child) -> ExitStatus {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(status) = child.try_wait().expect("failed to poll child") {
            return status;
        }

        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("Timed out waiting for hearth to exit");
        }

        thread::sleep(Duration::from_millis(50));
    }
}

/// Crash dumps in `dir` named like `Hearth-Crash-YYYYMMDD-HHMM.log`.
pub fn crash_dumps(dir: &Path) -> Vec<PathBuf> {
    CrashReporter::new("Hearth")
        .dumps_in(dir)
        .expect("failed to read dump directory")
}
