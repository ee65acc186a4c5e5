//! Crash diagnostics: capture the faulting stack, symbolize it, write a dump file
//! and terminate with [`CRASH_EXIT_CODE`].
//!
//! Dump names carry the capture time at minute granularity, so two crashes within
//! the same minute in the same directory overwrite each other. The capture time
//! is local time, but the UTC offset is resolved once when the reporter is built:
//! the fault path only reads the clock and never consults `TZ` or the environment.
//!
//! Frames are named through `dladdr`, which only sees dynamically exported
//! symbols. The `hearth` binary is linked with `-rdynamic` (see `build.rs`) so its
//! own functions resolve; frames in unexported code print their address instead.
mod frame;
mod unwind;

use std::{
    fmt,
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, FixedOffset, Local, Utc};

pub use frame::{StackFrame, SymbolName, format_address, format_frame_line, parse_address};
#[cfg(unix)]
pub use unwind::DlUnwinder;
pub use unwind::{NullUnwinder, Unwinder, platform_unwinder};

use crate::constants::{CRASH_EXIT_CODE, DUMP_TIMESTAMP_FORMAT, MAX_FRAMES};

/// The resolved stack of one fault.
#[derive(Debug, Clone)]
pub struct CrashReport {
    /// When the stack was captured.
    pub captured_at: DateTime<FixedOffset>,
    /// Signal that triggered the capture, if any.
    pub signal: Option<i32>,
    /// Innermost frame first, at most [`MAX_FRAMES`].
    pub frames: Vec<StackFrame>,
}

impl CrashReport {
    /// Walks the current stack into a fixed buffer and resolves every frame.
    /// The capture time is stamped with `utc_offset`.
    pub fn capture(
        unwinder: &dyn Unwinder,
        signal: Option<i32>,
        utc_offset: FixedOffset,
    ) -> Self {
        let mut addresses = [0usize; MAX_FRAMES];
        let count = unwinder.capture_frames(&mut addresses).min(MAX_FRAMES);
        let frames = addresses[..count]
            .iter()
            .map(|&address| unwinder.resolve(address))
            .collect();

        Self {
            captured_at: Utc::now().with_timezone(&utc_offset),
            signal,
            frames,
        }
    }

    /// Report lines, one per frame.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.frames
            .iter()
            .enumerate()
            .map(|(index, frame)| format_frame_line(index, frame))
    }
}

/// `<prefix>-Crash-<YYYYMMDD-HHMM>.log`.
pub fn dump_file_name(prefix: &str, captured_at: &DateTime<FixedOffset>) -> String {
    format!(
        "{prefix}-Crash-{}.log",
        captured_at.format(DUMP_TIMESTAMP_FORMAT)
    )
}

/// Writes crash dumps and terminates the process after a fault.
#[derive(Clone)]
pub struct CrashReporter {
    prefix: String,
    directory: PathBuf,
    utc_offset: FixedOffset,
    unwinder: &'static dyn Unwinder,
}

impl fmt::Debug for CrashReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrashReporter")
            .field("prefix", &self.prefix)
            .field("directory", &self.directory)
            .field("utc_offset", &self.utc_offset)
            .field("unwinder", &self.unwinder)
            .finish()
    }
}

impl CrashReporter {
    /// Reporter writing `<prefix>-Crash-*.log` into the working directory, with
    /// the current local UTC offset.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            directory: PathBuf::from("."),
            utc_offset: *Local::now().offset(),
            unwinder: platform_unwinder(),
        }
    }

    /// Writes dumps into `directory` instead of the working directory.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Stamps captures with `utc_offset` instead of the offset seen at construction.
    pub fn with_utc_offset(mut self, utc_offset: FixedOffset) -> Self {
        self.utc_offset = utc_offset;
        self
    }

    /// Replaces the platform unwinder.
    pub fn with_unwinder(mut self, unwinder: &'static dyn Unwinder) -> Self {
        self.unwinder = unwinder;
        self
    }

    /// File name prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Offset applied to capture times.
    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }

    /// Where the dump for a crash captured at `captured_at` goes.
    pub fn dump_path(&self, captured_at: &DateTime<FixedOffset>) -> PathBuf {
        self.directory.join(dump_file_name(&self.prefix, captured_at))
    }

    /// Writes `report` to its dump file, mirroring every line to `diagnostics`
    /// before it goes to the file. Mirroring continues even when the dump file
    /// cannot be created or written; the first such error is returned.
    pub fn write_report<W: Write>(
        &self,
        report: &CrashReport,
        diagnostics: &mut W,
    ) -> io::Result<PathBuf> {
        let path = self.dump_path(&report.captured_at);
        let _ = match report.signal {
            Some(signal) => writeln!(
                diagnostics,
                "{} caught fatal signal {signal}; writing {}",
                self.prefix,
                path.display()
            ),
            None => writeln!(diagnostics, "{} writing {}", self.prefix, path.display()),
        };

        let mut dump_error = None;
        let mut dump = match File::create(&path) {
            Ok(file) => Some(file),
            Err(err) => {
                let _ = writeln!(diagnostics, "Couldn't create crash dump: {err}");
                dump_error = Some(err);
                None
            }
        };

        for line in report.lines() {
            let _ = writeln!(diagnostics, "{line}");
            let failed = match dump.as_mut() {
                Some(file) => writeln!(file, "{line}").err(),
                None => None,
            };
            if let Some(err) = failed {
                dump = None;
                dump_error.get_or_insert(err);
            }
        }

        let _ = diagnostics.flush();
        match dump_error {
            Some(err) => Err(err),
            None => Ok(path),
        }
    }

    /// Captures the current stack with this reporter's unwinder and offset.
    pub fn capture(&self, signal: Option<i32>) -> CrashReport {
        CrashReport::capture(self.unwinder, signal, self.utc_offset)
    }

    /// Captures, reports and terminates. Called from the fault handler; never
    /// returns and runs no destructors.
    pub fn handle_fault(&self, signal: i32) -> ! {
        let report = self.capture(Some(signal));
        let mut stderr = io::stderr();
        let _ = self.write_report(&report, &mut stderr);
        // SAFETY: terminating without unwinding or atexit handlers; process state is
        // untrusted after a fault.
        unsafe { libc::_exit(CRASH_EXIT_CODE) }
    }

    /// Whether `name` looks like a dump this reporter writes.
    pub fn is_dump_name(&self, name: &str) -> bool {
        let Some(rest) = name
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix("-Crash-"))
            .and_then(|rest| rest.strip_suffix(".log"))
        else {
            return false;
        };
        let bytes = rest.as_bytes();
        bytes.len() == 13
            && bytes[8] == b'-'
            && bytes
                .iter()
                .enumerate()
                .all(|(i, b)| i == 8 || b.is_ascii_digit())
    }

    /// Dumps from this reporter currently present in `directory`.
    pub fn dumps_in(&self, directory: &Path) -> io::Result<Vec<PathBuf>> {
        let mut dumps: Vec<PathBuf> = std::fs::read_dir(directory)?
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| self.is_dump_name(name))
            })
            .map(|entry| entry.path())
            .collect();
        dumps.sort();
        Ok(dumps)
    }
}
