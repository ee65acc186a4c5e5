//! Run mode selection.
use strum_macros::{AsRefStr, Display, EnumString};

/// Which major subsystems this process hosts.
///
/// Selected once while building the [`AppContext`](crate::context::AppContext) and
/// read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, AsRefStr, Display)]
#[strum(ascii_case_insensitive)]
pub enum RunMode {
    /// Headless service only.
    #[strum(to_string = "service", serialize = "service-only", serialize = "core")]
    ServiceOnly,
    /// Interactive front end only.
    #[strum(
        to_string = "interactive",
        serialize = "interactive-only",
        serialize = "client"
    )]
    InteractiveOnly,
    /// Service and front end in one process.
    #[default]
    #[strum(to_string = "combined", serialize = "mono", serialize = "monolithic")]
    Combined,
}

impl RunMode {
    /// Whether the headless service is constructed in this mode.
    pub const fn runs_service(self) -> bool {
        matches!(self, Self::ServiceOnly | Self::Combined)
    }

    /// Whether the interactive front end is constructed in this mode.
    pub const fn runs_frontend(self) -> bool {
        matches!(self, Self::InteractiveOnly | Self::Combined)
    }
}
