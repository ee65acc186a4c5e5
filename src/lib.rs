//! Hearth supervises the lifecycle of a multi-mode network application: a headless
//! service, an interactive front end, or both in one process. It routes process
//! signals into either a cooperative shutdown or the crash pipeline, which captures
//! and symbolizes the faulting stack into a dump file before the process dies.

/// CLI interface.
pub mod cli;

/// Settings file loading.
pub mod config;

/// Exit codes, limits and file names.
pub mod constants;

/// Resolved per-process configuration.
pub mod context;

/// Crash capture, symbolization and dump writing.
pub mod crash;

/// Error handling.
pub mod error;

/// Interactive front end contract and console implementation.
pub mod frontend;

/// Subsystem orchestration around the main loop.
pub mod lifecycle;

/// Logging setup.
pub mod logs;

/// Run mode selection.
pub mod mode;

/// The blocking main loop.
pub mod runloop;

/// Headless service contract and reference implementation.
pub mod service;

/// Signal routing for graceful shutdown and fatal faults.
pub mod signals;

/// JSON state persistence.
pub mod state;
