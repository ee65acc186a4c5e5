//! Signal routing.
//!
//! Two handler bodies with different safety rules:
//! - graceful signals (SIGINT, SIGTERM) only touch atomics and write one byte to
//!   a non-blocking pipe, both async-signal-safe;
//! - fault signals (SIGABRT, SIGBUS, SIGSEGV) run the crash pipeline in signal
//!   context. That path is not signal-safe; if it faults again the process dies
//!   without a report because the fault handlers are reset to `SIG_DFL` first.
//!
//! Fault handlers run on a dedicated alternate stack registered for the thread
//! that installs them, so a SIGSEGV from stack exhaustion on that thread is
//! still reported.
use std::{
    hint::black_box,
    os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd},
    ptr,
    sync::{
        OnceLock,
        atomic::{AtomicBool, AtomicI32, Ordering},
    },
};

use nix::{
    errno::Errno,
    fcntl::{FcntlArg, OFlag, fcntl},
    sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal},
    unistd::{pipe, read},
};
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::debug;

use crate::{
    constants::{CRASH_EXIT_CODE, FAULT_STACK_SIZE},
    crash::CrashReporter,
    error::SignalError,
};

/// Signals that request a cooperative shutdown.
pub const GRACEFUL_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGTERM];

/// Signals that indicate the process state can no longer be trusted.
pub const FAULT_SIGNALS: [Signal; 3] = [Signal::SIGABRT, Signal::SIGBUS, Signal::SIGSEGV];

/// Every signal the router installs a handler for.
pub const ROUTED_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGABRT,
    Signal::SIGBUS,
    Signal::SIGSEGV,
];

/// How a recognized signal is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalClass {
    /// Request main loop exit.
    Graceful,
    /// Report the crash and terminate.
    Fault,
}

/// A classified signal. Plain data, safe to build inside a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalEvent {
    /// Raw signal number.
    pub signal: i32,
    /// Routing decision.
    pub class: SignalClass,
}

impl SignalEvent {
    /// Classifies `signal`, or `None` if it is not routed.
    pub fn classify(signal: i32) -> Option<Self> {
        let class = if GRACEFUL_SIGNALS.iter().any(|s| *s as i32 == signal) {
            SignalClass::Graceful
        } else if FAULT_SIGNALS.iter().any(|s| *s as i32 == signal) {
            SignalClass::Fault
        } else {
            return None;
        };
        Some(Self { signal, class })
    }
}

/// Set-once shutdown request shared between a signal handler and the main loop.
///
/// All state is single-word atomics; [`ShutdownFlag::request`] allocates nothing
/// and is safe to call from a signal handler.
#[derive(Debug)]
pub struct ShutdownFlag {
    requested: AtomicBool,
    signal: AtomicI32,
    wake_fd: AtomicI32,
}

impl ShutdownFlag {
    /// Creates an unset flag with no wakeup pipe attached.
    pub const fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            signal: AtomicI32::new(0),
            wake_fd: AtomicI32::new(-1),
        }
    }

    /// Records a shutdown request. Only the first call has any effect; returns
    /// whether this call was the first.
    pub fn request(&self, signal: i32) -> bool {
        if self.requested.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.signal.store(signal, Ordering::Release);
        self.wake();
        true
    }

    /// Whether shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// The signal that requested shutdown, if any.
    pub fn requested_signal(&self) -> Option<i32> {
        self.is_requested().then(|| self.signal.load(Ordering::Acquire))
    }

    /// Routes future wakeups to `pipe`.
    pub fn attach(&self, pipe: &WakePipe) {
        self.wake_fd.store(pipe.write.as_raw_fd(), Ordering::Release);
    }

    /// Stops writing wakeups.
    pub fn detach(&self) {
        self.wake_fd.store(-1, Ordering::Release);
    }

    fn wake(&self) {
        let fd = self.wake_fd.load(Ordering::Acquire);
        if fd < 0 {
            return;
        }
        let byte = 1u8;
        // SAFETY: write(2) is async-signal-safe; the pipe is non-blocking so a full
        // pipe drops the byte, which is fine because the flag is already set.
        unsafe {
            libc::write(fd, (&byte as *const u8).cast(), 1);
        }
    }
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Self-pipe used to wake the main loop from a signal handler.
#[derive(Debug)]
pub struct WakePipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl WakePipe {
    /// Creates a non-blocking pipe pair.
    pub fn new() -> Result<Self, SignalError> {
        let (read, write) = pipe().map_err(SignalError::Pipe)?;
        set_nonblocking(&read)?;
        set_nonblocking(&write)?;
        Ok(Self { read, write })
    }

    /// Read end, for polling.
    pub fn reader(&self) -> BorrowedFd<'_> {
        self.read.as_fd()
    }

    /// Discards pending wakeup bytes.
    pub fn drain(&self) {
        let mut buf = [0u8; 64];
        while let Ok(n) = read(self.read.as_raw_fd(), &mut buf) {
            if n == 0 {
                break;
            }
        }
    }
}

fn set_nonblocking(fd: &OwnedFd) -> Result<(), SignalError> {
    let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL).map_err(SignalError::Pipe)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags)).map_err(SignalError::Pipe)?;
    Ok(())
}

/// Fault signal to raise on purpose, for exercising the crash pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FaultKind {
    /// SIGABRT.
    Abort,
    /// SIGBUS.
    Bus,
    /// SIGSEGV.
    Segv,
    /// SIGSEGV from unbounded recursion exhausting the stack.
    Overflow,
}

impl FaultKind {
    /// The signal this fault raises.
    pub const fn signal(self) -> Signal {
        match self {
            Self::Abort => Signal::SIGABRT,
            Self::Bus => Signal::SIGBUS,
            Self::Segv | Self::Overflow => Signal::SIGSEGV,
        }
    }

    /// Raises the signal on the calling thread. `Overflow` recurses until the
    /// kernel delivers SIGSEGV and does not return while a handler is installed.
    pub fn raise(self) -> Result<(), nix::Error> {
        match self {
            Self::Overflow => {
                exhaust_stack(0);
                Ok(())
            }
            _ => signal::raise(self.signal()),
        }
    }
}

#[inline(never)]
#[allow(unconditional_recursion)]
fn exhaust_stack(depth: u64) -> u64 {
    let frame = black_box([depth as u8; 512]);
    let inner = exhaust_stack(depth.wrapping_add(1));
    inner.wrapping_add(u64::from(black_box(frame)[0]))
}

/// Registers a leaked buffer of [`FAULT_STACK_SIZE`] bytes as the calling
/// thread's alternate signal stack.
fn install_alt_stack() -> Result<(), SignalError> {
    let stack: &'static mut [u8] = Box::leak(vec![0u8; FAULT_STACK_SIZE].into_boxed_slice());
    let alt = libc::stack_t {
        ss_sp: stack.as_mut_ptr().cast(),
        ss_flags: 0,
        ss_size: stack.len(),
    };
    // SAFETY: the buffer is leaked, so it outlives every handler that can run on it.
    if unsafe { libc::sigaltstack(&alt, ptr::null_mut()) } != 0 {
        return Err(SignalError::AltStack(Errno::last()));
    }
    Ok(())
}

/// The disposition for a signal of `class`. Fault handlers run once on the
/// alternate stack.
fn action_for(class: SignalClass) -> SigAction {
    match class {
        SignalClass::Graceful => SigAction::new(
            SigHandler::Handler(handle_graceful),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        ),
        SignalClass::Fault => SigAction::new(
            SigHandler::Handler(handle_fault),
            SaFlags::SA_RESETHAND | SaFlags::SA_ONSTACK,
            SigSet::empty(),
        ),
    }
}

static SHUTDOWN: ShutdownFlag = ShutdownFlag::new();
static CRASH_REPORTER: OnceLock<CrashReporter> = OnceLock::new();
static INSTALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_graceful(signal: libc::c_int) {
    let saved = Errno::last_raw();
    SHUTDOWN.request(signal);
    Errno::set_raw(saved);
}

extern "C" fn handle_fault(signal: libc::c_int) {
    for fault in FAULT_SIGNALS {
        // SAFETY: resetting dispositions is async-signal-safe.
        unsafe {
            libc::signal(fault as libc::c_int, libc::SIG_DFL);
        }
    }

    match CRASH_REPORTER.get() {
        Some(reporter) => reporter.handle_fault(signal),
        // SAFETY: `_exit` skips destructors and atexit handlers, which is the point.
        None => unsafe { libc::_exit(CRASH_EXIT_CODE) },
    }
}

/// Owns the shutdown flag and wakeup pipe the main loop waits on, and installs the
/// process-wide handlers that feed them.
#[derive(Debug)]
pub struct SignalRouter {
    flag: &'static ShutdownFlag,
    pipe: WakePipe,
    reporter: Option<CrashReporter>,
}

impl SignalRouter {
    /// Router for the process: [`install_handlers`](Self::install_handlers) hooks
    /// the OS signals and hands `reporter` to the fault handler.
    pub fn for_process(reporter: CrashReporter) -> Result<Self, SignalError> {
        let pipe = WakePipe::new()?;
        Ok(Self {
            flag: &SHUTDOWN,
            pipe,
            reporter: Some(reporter),
        })
    }

    /// Router that never touches process signal dispositions. Shutdown is
    /// requested directly through `flag`; used to embed or test the lifecycle.
    pub fn detached(flag: &'static ShutdownFlag) -> Result<Self, SignalError> {
        let pipe = WakePipe::new()?;
        flag.attach(&pipe);
        Ok(Self {
            flag,
            pipe,
            reporter: None,
        })
    }

    /// Registers one handler per routed signal. Must run before any subsystem
    /// starts. A detached router has nothing to install.
    pub fn install_handlers(&mut self) -> Result<(), SignalError> {
        let Some(reporter) = self.reporter.take() else {
            debug!("Detached signal router; process handlers left untouched");
            return Ok(());
        };

        if INSTALLED.swap(true, Ordering::SeqCst) {
            return Err(SignalError::AlreadyInstalled);
        }

        let _ = CRASH_REPORTER.set(reporter);
        self.flag.attach(&self.pipe);
        install_alt_stack()?;

        for sig in ROUTED_SIGNALS {
            let Some(event) = SignalEvent::classify(sig as i32) else {
                continue;
            };
            // SAFETY: graceful handlers only touch atomics and write(2); the fault
            // handler is knowingly not signal-safe, see module docs.
            unsafe { signal::sigaction(sig, &action_for(event.class)) }
                .map_err(|source| SignalError::Install { signal: sig, source })?;
        }

        debug!(
            "Installed handlers for {:?} (graceful) and {:?} (fault)",
            GRACEFUL_SIGNALS, FAULT_SIGNALS
        );
        Ok(())
    }

    /// The flag the handlers set.
    pub fn flag(&self) -> &'static ShutdownFlag {
        self.flag
    }

    /// The wakeup pipe.
    pub fn pipe(&self) -> &WakePipe {
        &self.pipe
    }
}

impl Drop for SignalRouter {
    fn drop(&mut self) {
        self.flag.detach();
    }
}
