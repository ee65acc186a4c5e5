//! Error handling for hearth.
//!
//! Only configuration and degraded-start problems travel through these types.
//! Fatal faults never do: they go straight to the crash pipeline.
use std::{io, path::PathBuf};

use nix::sys::signal::Signal;
use thiserror::Error;

use crate::mode::RunMode;

/// Problems with the command line or the settings file. Reported with usage
/// text before any subsystem starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading the settings file.
    #[error("Failed to read settings file '{path}': {source}")]
    Read {
        /// Path that could not be read.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    /// Error parsing YAML settings.
    #[error("Invalid YAML format: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A `${VAR}` reference in the settings file names an unset variable.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// Error compiling the variable expansion pattern.
    #[error("Invalid expansion pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A setting has a value that cannot be used.
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue {
        /// Name of the offending setting.
        key: &'static str,
        /// Why the value was rejected.
        message: String,
    },

    /// An option that the selected run mode does not register was supplied.
    #[error("Option '{option}' is not available in {mode} mode")]
    OptionNotAvailable {
        /// The offending command-line flag.
        option: &'static str,
        /// The active run mode.
        mode: RunMode,
    },
}

/// Error type for persisted state files.
#[derive(Debug, Error)]
pub enum StateError {
    /// No state has been persisted yet.
    #[error("No persisted state at {0}")]
    NotFound(PathBuf),

    /// Error reading or writing the state file.
    #[error("State file I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Error encoding or decoding the JSON contents.
    #[error("Failed to encode or decode state: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Errors raised by the headless service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Error binding the listening socket.
    #[error("Failed to listen on port {port}: {source}")]
    Bind {
        /// The port that could not be bound.
        port: u16,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    /// Socket I/O failure while serving.
    #[error("Service I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by the interactive front end.
#[derive(Debug, Error)]
pub enum FrontendError {
    /// Terminal I/O failure.
    #[error("Front end I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The service the front end was wired to is gone.
    #[error("Service is no longer reachable")]
    ServiceUnavailable,
}

/// Errors raised while installing signal handling.
#[derive(Debug, Error)]
pub enum SignalError {
    /// `sigaction` rejected a handler.
    #[error("Failed to install handler for {signal}: {source}")]
    Install {
        /// The signal whose handler failed to install.
        signal: Signal,
        /// The underlying error that occurred.
        #[source]
        source: nix::Error,
    },

    /// Creating or configuring the wakeup pipe failed.
    #[error("Failed to set up wakeup pipe: {0}")]
    Pipe(#[source] nix::Error),

    /// `sigaltstack` rejected the fault handler stack.
    #[error("Failed to set up alternate signal stack: {0}")]
    AltStack(#[source] nix::Error),

    /// Process-wide handlers may only be installed once.
    #[error("Signal handlers are already installed")]
    AlreadyInstalled,
}

/// Errors that abort the lifecycle before or during startup.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Signal handling could not be set up.
    #[error(transparent)]
    Signal(#[from] SignalError),

    /// The service could not be constructed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The front end could not be constructed.
    #[error(transparent)]
    Frontend(#[from] FrontendError),

    /// `run` was called on an orchestrator that already ran.
    #[error("Lifecycle already ran")]
    AlreadyRan,
}
