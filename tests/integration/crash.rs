#[path = "common/mod.rs"]
mod common;

use std::{fs, time::Duration};

use assert_cmd::Command;
use common::crash_dumps;
use predicates::str::contains;
use regex::Regex;
use tempfile::tempdir;

/// Runs a service that raises `fault` and returns the lines of its single dump.
fn assert_crash_dump(fault: &str) -> Vec<String> {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();

    Command::new(assert_cmd::cargo::cargo_bin!("hearth"))
        .args(["-m", "service", "-p", "0", "-n", "--raise-fault", fault])
        .arg("--datadir")
        .arg(dir.join("data"))
        .current_dir(dir)
        .env("HOME", dir)
        .timeout(Duration::from_secs(20))
        .assert()
        .code(27)
        .stderr(contains("caught fatal signal"))
        .stderr(contains("#000 "));

    let dumps = crash_dumps(dir);
    assert_eq!(dumps.len(), 1, "expected one dump, found {dumps:?}");

    let content = fs::read_to_string(&dumps[0]).expect("failed to read dump");
    let lines: Vec<String> = content.lines().map(str::to_owned).collect();
    assert!(!lines.is_empty());
    assert!(lines.len() <= 128);
    assert!(lines[0].starts_with("#000 "), "first line: {}", lines[0]);

    let width = std::mem::size_of::<usize>() * 2;
    let line = Regex::new(&format!(r"^#\d{{3}} .{{20,}} 0x[0-9a-f]{{{width}}} .+$")).unwrap();
    for (index, entry) in lines.iter().enumerate() {
        assert!(line.is_match(entry), "malformed line: {entry}");
        assert!(entry.starts_with(&format!("#{index:03} ")));
    }
    lines
}

#[test]
fn abort_writes_dump_and_exits_27() {
    let lines = assert_crash_dump("abort");

    // glibc's abort path goes through exported functions, so some frame must
    // resolve to a name rather than an address.
    if cfg!(all(target_os = "linux", target_env = "gnu")) {
        let named = lines
            .iter()
            .filter_map(|line| line.rsplit(' ').next())
            .any(|label| !label.starts_with("0x"));
        assert!(named, "no symbolized frame in:\n{}", lines.join("\n"));
    }
}

#[test]
fn bus_error_writes_dump_and_exits_27() {
    assert_crash_dump("bus");
}

#[test]
fn segfault_writes_dump_and_exits_27() {
    assert_crash_dump("segv");
}

#[test]
fn stack_overflow_writes_dump_and_exits_27() {
    let lines = assert_crash_dump("overflow");
    assert!(lines.len() > 1);
}

#[test]
fn interactive_mode_reports_crashes_too() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();

    Command::new(assert_cmd::cargo::cargo_bin!("hearth"))
        .args(["-m", "interactive", "--raise-fault", "segv"])
        .current_dir(dir)
        .env("HOME", dir)
        .write_stdin("")
        .timeout(Duration::from_secs(20))
        .assert()
        .code(27);

    assert_eq!(crash_dumps(dir).len(), 1);
}
