//! Process configuration resolved once at startup.
//!
//! Command-line flags win over the settings file, which wins over built-in
//! defaults. The result is passed by reference to everything that needs it.
use std::{env, path::PathBuf, time::Duration};

use crate::{
    cli::{Cli, LogLevelArg},
    config::{Settings, load_settings},
    constants::{
        APP_DISPLAY_NAME, APP_NAME, DEFAULT_CRASH_PREFIX, DEFAULT_PORT, DEFAULT_TICK_MS,
        ORGANIZATION_NAME,
    },
    error::ConfigError,
    mode::RunMode,
    signals::FaultKind,
};

/// Who this process is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    /// Binary name.
    pub name: &'static str,
    /// Name shown to users.
    pub display_name: &'static str,
    /// Organization name.
    pub organization: &'static str,
    /// Crate version.
    pub version: &'static str,
}

impl Default for AppIdentity {
    fn default() -> Self {
        Self {
            name: APP_NAME,
            display_name: APP_DISPLAY_NAME,
            organization: ORGANIZATION_NAME,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Options consumed by the headless service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Listen port.
    pub port: u16,
    /// Whether to restore persisted state before the main loop.
    pub restore: bool,
    /// Directory holding persisted state.
    pub data_dir: PathBuf,
    /// Log file, if logging goes to a file.
    pub log_file: Option<PathBuf>,
}

/// Options consumed by the interactive front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendOptions {
    /// Trace view switches.
    pub debug_buffer_switches: bool,
    /// Trace model updates.
    pub debug_model: bool,
    /// Directory holding the session file.
    pub data_dir: PathBuf,
}

/// Everything the lifecycle needs to know about this process.
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Identity and version.
    pub identity: AppIdentity,
    /// Selected run mode.
    pub mode: RunMode,
    /// Service options (ignored when the mode has no service).
    pub service: ServiceOptions,
    /// Front end options (ignored when the mode has no front end).
    pub frontend: FrontendOptions,
    /// `EnvFilter` directive, when one was configured.
    pub log_filter: Option<String>,
    /// Prefix of crash dump file names.
    pub crash_prefix: String,
    /// Main loop tick.
    pub tick: Duration,
    /// Fault to raise once running.
    pub raise_fault: Option<FaultKind>,
}

/// `$HOME/.local/share/hearth`, or the working directory when `HOME` is unset.
pub fn default_data_dir() -> PathBuf {
    env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".local/share").join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl AppContext {
    /// Loads the settings file named by `--config`, if any, and resolves.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let settings = match &cli.config {
            Some(path) => load_settings(path)?,
            None => Settings::default(),
        };
        Self::resolve(cli, settings)
    }

    /// Merges flags over settings over defaults and validates the result.
    pub fn resolve(cli: &Cli, settings: Settings) -> Result<Self, ConfigError> {
        let mode = match (cli.mode, settings.mode.as_deref()) {
            (Some(mode), _) => mode,
            (None, Some(raw)) => raw.parse::<RunMode>().map_err(|_| ConfigError::InvalidValue {
                key: "mode",
                message: format!("unknown run mode '{raw}'"),
            })?,
            (None, None) => RunMode::default(),
        };
        cli.check_mode(mode)?;

        let log_filter = if cli.debug {
            Some("debug".to_string())
        } else if let Some(level) = cli.log_level {
            Some(level.as_str().to_string())
        } else if let Some(raw) = settings.log_level.as_deref() {
            let level: LogLevelArg = raw.parse().map_err(|message| {
                ConfigError::InvalidValue {
                    key: "log_level",
                    message,
                }
            })?;
            Some(level.as_str().to_string())
        } else {
            None
        };

        let crash_prefix = settings
            .crash_prefix
            .unwrap_or_else(|| DEFAULT_CRASH_PREFIX.to_string());
        if crash_prefix.is_empty() || crash_prefix.contains('/') {
            return Err(ConfigError::InvalidValue {
                key: "crash_prefix",
                message: format!("'{crash_prefix}' is not a plain file name prefix"),
            });
        }

        let tick_ms = settings.tick_ms.unwrap_or(DEFAULT_TICK_MS);
        if tick_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "tick_ms",
                message: "must be at least 1".to_string(),
            });
        }

        let data_dir = cli
            .data_dir
            .clone()
            .or(settings.data_dir)
            .unwrap_or_else(default_data_dir);

        let log_file = if mode.runs_service() {
            cli.log_file.clone().or(settings.log_file)
        } else {
            None
        };

        Ok(Self {
            identity: AppIdentity::default(),
            mode,
            service: ServiceOptions {
                port: cli.port.or(settings.port).unwrap_or(DEFAULT_PORT),
                restore: !cli.no_restore && settings.restore.unwrap_or(true),
                data_dir: data_dir.clone(),
                log_file,
            },
            frontend: FrontendOptions {
                debug_buffer_switches: cli.debug_buffer_switches,
                debug_model: cli.debug_model,
                data_dir,
            },
            log_filter,
            crash_prefix,
            tick: Duration::from_millis(tick_ms),
            raise_fault: cli.raise_fault,
        })
    }

    /// One-line banner: name, version and mode.
    pub fn banner(&self) -> String {
        format!(
            "{} {} ({} mode) - {}",
            self.identity.display_name,
            self.identity.version,
            self.mode,
            self.identity.organization
        )
    }
}
