//! Constants shared by the lifecycle controller and the crash pipeline.
//!
//! Exit codes are part of the external contract: supervisors and test harnesses
//! key off them to tell a clean exit from a crash or a usage error.

// ============================================================================
// Identity
// ============================================================================

/// Binary and directory name.
pub const APP_NAME: &str = "hearth";

/// Human-readable application name used in banners.
pub const APP_DISPLAY_NAME: &str = "Hearth";

/// Organization shown alongside the version banner.
pub const ORGANIZATION_NAME: &str = "Hearth Project";

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit status after a fatal fault has been reported.
/// Distinct from every status the main loop or the CLI can produce.
pub const CRASH_EXIT_CODE: i32 = 27;

/// Exit status for bad or missing command-line arguments.
pub const USAGE_EXIT_CODE: i32 = 1;

/// Exit status when a subsystem cannot be constructed or initialized.
pub const STARTUP_FAILURE_EXIT_CODE: i32 = 2;

// ============================================================================
// Crash Reporting
// ============================================================================

/// Upper bound on captured frames. Bounds the work done inside a fault handler.
pub const MAX_FRAMES: usize = 128;

/// Minimum column width of the module name in a report line.
pub const MODULE_COLUMN_WIDTH: usize = 20;

/// Marker printed when a frame has no owning module.
pub const UNKNOWN_MODULE: &str = "unknown";

/// Hex digits needed to print a pointer: 8 on 32-bit, 16 on 64-bit.
pub const POINTER_HEX_WIDTH: usize = std::mem::size_of::<usize>() * 2;

/// `chrono` format of the timestamp embedded in dump file names (minute granularity).
pub const DUMP_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M";

/// Default prefix of crash dump file names.
pub const DEFAULT_CRASH_PREFIX: &str = "Hearth";

/// Size of the alternate stack the fault handler runs on. Must hold the unwinder,
/// symbol lookup and line formatting when the main stack is exhausted.
pub const FAULT_STACK_SIZE: usize = 256 * 1024;

// ============================================================================
// Service Defaults
// ============================================================================

/// Port the headless service listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 4242;

/// Persisted service state, relative to the data directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// Persisted front end session, relative to the data directory.
pub const SESSION_FILE_NAME: &str = "frontend-session.json";

// ============================================================================
// Main Loop Timing
// ============================================================================

/// Default interval between main loop turns when no wakeup arrives.
pub const DEFAULT_TICK_MS: u64 = 100;
