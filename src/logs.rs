//! Logging setup: `tracing-subscriber` with an `EnvFilter`, written to stderr or
//! appended to a log file.
use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Where log output ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Standard error.
    Stderr,
    /// Appended to this file.
    File(PathBuf),
}

/// Opens `path` for appending, creating it if needed.
pub fn open_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Filter for `directive`, else `RUST_LOG`, else `info`.
pub fn build_filter(directive: Option<&str>) -> EnvFilter {
    match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Installs the global subscriber. An unopenable log file is a degraded start:
/// output falls back to stderr with a warning.
pub fn init_logging(directive: Option<&str>, log_file: Option<&Path>) -> LogTarget {
    let filter = build_filter(directive);

    let (file, failed) = match log_file.map(|path| (path, open_log_file(path))) {
        Some((path, Ok(file))) => (Some((path, file)), None),
        Some((path, Err(err))) => (None, Some((path, err))),
        None => (None, None),
    };

    let target = match file {
        Some((path, file)) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
            LogTarget::File(path.to_path_buf())
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .try_init();
            LogTarget::Stderr
        }
    };

    if let Some((path, err)) = failed {
        warn!(
            "Couldn't open logfile '{}' - will log to stderr instead ({err})",
            path.display()
        );
    }
    target
}
