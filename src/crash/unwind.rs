//! Stack capture and symbol lookup behind a per-platform capability.
use std::fmt;

use super::frame::StackFrame;

/// Captures raw return addresses and resolves them to frames.
///
/// Implementations run inside a fault handler: `capture_frames` must not
/// allocate, and neither method may panic.
pub trait Unwinder: Send + Sync + fmt::Debug {
    /// Fills `buf` with return addresses, innermost first, and returns how many
    /// were written. Returns 0 when the platform cannot unwind.
    fn capture_frames(&self, buf: &mut [usize]) -> usize;

    /// Describes one return address.
    fn resolve(&self, address: usize) -> StackFrame;
}

/// Unix unwinder: `backtrace` walks the stack, `dladdr` consults the dynamic
/// symbol table.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DlUnwinder;

#[cfg(unix)]
impl Unwinder for DlUnwinder {
    fn capture_frames(&self, buf: &mut [usize]) -> usize {
        let mut count = 0;
        // SAFETY: the unsynchronized variant skips the global lock, which may be
        // held by the very code that faulted.
        unsafe {
            backtrace::trace_unsynchronized(|frame| {
                let Some(slot) = buf.get_mut(count) else {
                    return false;
                };
                *slot = frame.ip() as usize;
                count += 1;
                true
            });
        }
        count
    }

    fn resolve(&self, address: usize) -> StackFrame {
        use std::{ffi::CStr, mem::MaybeUninit};

        use super::frame::SymbolName;

        let mut info = MaybeUninit::<libc::Dl_info>::zeroed();
        // SAFETY: dladdr only reads `address` as a lookup key and fills `info`.
        let found = unsafe { libc::dladdr(address as *const libc::c_void, info.as_mut_ptr()) };
        if found == 0 {
            return StackFrame::unresolved(address);
        }
        // SAFETY: zero-initialized and filled in by a successful dladdr call.
        let info = unsafe { info.assume_init() };

        let module = (!info.dli_fname.is_null()).then(|| {
            // SAFETY: non-null dli_fname points at a NUL-terminated string owned by
            // the dynamic loader.
            unsafe { CStr::from_ptr(info.dli_fname) }
                .to_string_lossy()
                .into_owned()
        });

        if info.dli_sname.is_null() {
            return StackFrame {
                module,
                ..StackFrame::unresolved(address)
            };
        }

        // SAFETY: as above, for dli_sname.
        let raw = unsafe { CStr::from_ptr(info.dli_sname) }.to_string_lossy();
        StackFrame {
            address,
            module,
            symbol: SymbolName::from_mangled(&raw),
            offset: address.saturating_sub(info.dli_saddr as usize),
        }
    }
}

/// Unwinder for platforms without stack walking: captures nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullUnwinder;

impl Unwinder for NullUnwinder {
    fn capture_frames(&self, _buf: &mut [usize]) -> usize {
        0
    }

    fn resolve(&self, address: usize) -> StackFrame {
        StackFrame::unresolved(address)
    }
}

/// The unwinder for the build target.
pub fn platform_unwinder() -> &'static dyn Unwinder {
    #[cfg(unix)]
    {
        &DlUnwinder
    }
    #[cfg(not(unix))]
    {
        &NullUnwinder
    }
}
