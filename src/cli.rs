//! Command-line interface for Hearth.
use std::{path::PathBuf, str::FromStr};

use clap::{Parser, error::ErrorKind};
use tracing::level_filters::LevelFilter;

use crate::{
    constants::USAGE_EXIT_CODE, error::ConfigError, mode::RunMode, signals::FaultKind,
};

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };

            return Ok(LogLevelArg(level));
        }

        let lowercase = trimmed.to_ascii_lowercase();
        let level = match lowercase.as_str() {
            "off" => Some(LevelFilter::OFF),
            "error" | "err" => Some(LevelFilter::ERROR),
            "warn" | "warning" => Some(LevelFilter::WARN),
            "info" | "information" => Some(LevelFilter::INFO),
            "debug" => Some(LevelFilter::DEBUG),
            "trace" => Some(LevelFilter::TRACE),
            _ => None,
        }
        .ok_or_else(|| format!("invalid log level '{trimmed}'"))?;

        Ok(LogLevelArg(level))
    }
}

/// Command-line interface for Hearth.
///
/// Every mode parses the same flag table; [`Cli::check_mode`] rejects flags the
/// selected mode does not register.
#[derive(Parser, Debug)]
#[command(name = "hearth", version, author)]
#[command(
    about = "Runs the network service, the interactive front end, or both",
    long_about = None
)]
pub struct Cli {
    /// Run mode: service, interactive or combined [default: combined].
    #[arg(short, long, value_name = "MODE")]
    pub mode: Option<RunMode>,

    /// Optional YAML settings file.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// The port the service will listen at [default: 4242].
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Don't restore the service's last state.
    #[arg(short = 'n', long = "norestore")]
    pub no_restore: bool,

    /// Path to logfile.
    #[arg(short = 'l', long = "logfile", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Loglevel Debug|Info|Warning|Error (or 0-5) [default: info].
    #[arg(short = 'L', long = "loglevel", value_name = "LEVEL")]
    pub log_level: Option<LogLevelArg>,

    /// Directory holding data files such as persisted state.
    #[arg(long = "datadir", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Enables debugging for buffer switches.
    #[arg(long = "debugbufferswitches")]
    pub debug_buffer_switches: bool,

    /// Enables debugging for models.
    #[arg(long = "debugmodel")]
    pub debug_model: bool,

    /// Enable debug output.
    #[arg(short, long)]
    pub debug: bool,

    /// Raise a fault signal once the main loop runs (crash pipeline drills).
    #[arg(long = "raise-fault", value_name = "SIGNAL", hide = true)]
    pub raise_fault: Option<FaultKind>,
}

impl Cli {
    /// Flags only registered when the service runs in this process.
    fn service_flags(&self) -> [(&'static str, bool); 5] {
        [
            ("--port", self.port.is_some()),
            ("--norestore", self.no_restore),
            ("--logfile", self.log_file.is_some()),
            ("--loglevel", self.log_level.is_some()),
            ("--datadir", self.data_dir.is_some()),
        ]
    }

    /// Flags only registered when the front end runs in this process.
    fn frontend_flags(&self) -> [(&'static str, bool); 2] {
        [
            ("--debugbufferswitches", self.debug_buffer_switches),
            ("--debugmodel", self.debug_model),
        ]
    }

    /// Rejects flags that `mode` does not register.
    pub fn check_mode(&self, mode: RunMode) -> Result<(), ConfigError> {
        let mut rejected = Vec::new();
        if !mode.runs_service() {
            rejected.extend(self.service_flags());
        }
        if !mode.runs_frontend() {
            rejected.extend(self.frontend_flags());
        }

        match rejected.into_iter().find(|(_, set)| *set) {
            Some((option, _)) => Err(ConfigError::OptionNotAvailable { option, mode }),
            None => Ok(()),
        }
    }
}

/// Parses process arguments. Errors carry clap's rendered usage text.
pub fn parse_args() -> Result<Cli, clap::Error> {
    Cli::try_parse()
}

/// Exit status for a parse that ended without a [`Cli`]. Help goes down the
/// usage path; only `--version` counts as success.
pub fn parse_exit_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayVersion => 0,
        _ => USAGE_EXIT_CODE,
    }
}
