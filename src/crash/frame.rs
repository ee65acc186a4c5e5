//! Resolved stack frames and their report formatting.
use std::path::Path;

use crate::constants::{MODULE_COLUMN_WIDTH, POINTER_HEX_WIDTH, UNKNOWN_MODULE};

/// Name of the symbol covering a frame's address.
///
/// An unresolved frame carries no name at all, so a frame can never be both
/// nameless and demangled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolName {
    /// Human-readable name recovered from a mangled symbol.
    Demangled(String),
    /// Symbol name as stored in the symbol table (demangling failed or not needed).
    Raw(String),
    /// No symbol covers the address.
    Unresolved,
}

impl SymbolName {
    /// Demangles `raw`, keeping it verbatim when it is not a mangled name.
    pub fn from_mangled(raw: &str) -> Self {
        match rustc_demangle::try_demangle(raw) {
            Ok(demangled) => Self::Demangled(format!("{demangled:#}")),
            Err(_) => Self::Raw(raw.to_string()),
        }
    }

    /// The name, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Demangled(name) | Self::Raw(name) => Some(name),
            Self::Unresolved => None,
        }
    }
}

/// One return address and what the symbol table knows about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Raw return address.
    pub address: usize,
    /// Path of the object file containing the address.
    pub module: Option<String>,
    /// Nearest preceding exported symbol.
    pub symbol: SymbolName,
    /// Byte offset of `address` from the symbol start (0 when unresolved).
    pub offset: usize,
}

impl StackFrame {
    /// Frame for an address nothing could be learned about.
    pub fn unresolved(address: usize) -> Self {
        Self {
            address,
            module: None,
            symbol: SymbolName::Unresolved,
            offset: 0,
        }
    }

    /// Final path component of the module, right-padded for column alignment.
    pub fn module_label(&self) -> String {
        let name = self
            .module
            .as_deref()
            .map(|module| {
                Path::new(module)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| module.to_string())
            })
            .unwrap_or_else(|| UNKNOWN_MODULE.to_string());
        format!("{name:<MODULE_COLUMN_WIDTH$}")
    }

    /// Symbol name with offset, or the address itself when unresolved.
    pub fn function_label(&self) -> String {
        match self.symbol.as_str() {
            Some(name) if self.offset > 0 => format!("{name}+0x{:x}", self.offset),
            Some(name) => name.to_string(),
            None => format_address(self.address),
        }
    }
}

/// `0x` followed by the address zero-padded to the platform pointer width.
pub fn format_address(address: usize) -> String {
    format!("0x{address:0POINTER_HEX_WIDTH$x}")
}

/// Inverse of [`format_address`].
pub fn parse_address(text: &str) -> Option<usize> {
    let digits = text.strip_prefix("0x")?;
    if digits.len() != POINTER_HEX_WIDTH {
        return None;
    }
    usize::from_str_radix(digits, 16).ok()
}

/// One report line: `#<index> <module> <address> <function>`.
pub fn format_frame_line(index: usize, frame: &StackFrame) -> String {
    format!(
        "#{index:03} {} {} {}",
        frame.module_label(),
        format_address(frame.address),
        frame.function_label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demangles_rust_symbols() {
        let name = SymbolName::from_mangled("_ZN4core3fmt5write17h0123456789abcdefE");
        assert_eq!(name, SymbolName::Demangled("core::fmt::write".to_string()));
    }

    #[test]
    fn keeps_unmangled_names_raw() {
        assert_eq!(
            SymbolName::from_mangled("getpid"),
            SymbolName::Raw("getpid".to_string())
        );
    }

    #[test]
    fn unresolved_frame_falls_back_to_address() {
        let frame = StackFrame::unresolved(0xdead_beef);
        let label = frame.function_label();

        assert_eq!(frame.symbol.as_str(), None);
        assert_eq!(label.len(), 2 + POINTER_HEX_WIDTH);
        assert_eq!(parse_address(&label), Some(0xdead_beef));
    }

    #[test]
    fn module_label_keeps_file_name_and_pads() {
        let mut frame = StackFrame::unresolved(1);
        frame.module = Some("/usr/lib/x86_64-linux-gnu/libc.so.6".to_string());
        assert_eq!(frame.module_label(), format!("{:<20}", "libc.so.6"));

        frame.module = Some("/opt/hearth/bin/a-very-long-module-name-indeed".to_string());
        assert_eq!(frame.module_label(), "a-very-long-module-name-indeed");
    }

    #[test]
    fn missing_module_is_unknown() {
        assert_eq!(StackFrame::unresolved(1).module_label().trim_end(), UNKNOWN_MODULE);
    }

    #[test]
    fn line_layout() {
        let frame = StackFrame {
            address: 0x1000,
            module: Some("/bin/hearth".to_string()),
            symbol: SymbolName::Raw("main".to_string()),
            offset: 0x2a,
        };
        let expected = format!(
            "#007 {:<20} 0x{:0width$x} main+0x2a",
            "hearth",
            0x1000,
            width = POINTER_HEX_WIDTH
        );
        assert_eq!(format_frame_line(7, &frame), expected);
    }

    #[test]
    fn parse_rejects_malformed_addresses() {
        assert_eq!(parse_address("1000"), None);
        assert_eq!(parse_address("0x1000"), None);
        assert_eq!(parse_address(&format!("0x{}", "g".repeat(POINTER_HEX_WIDTH))), None);
    }
}
