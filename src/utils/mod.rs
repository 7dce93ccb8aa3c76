//! Utility functions module
//!
//! Formatting helpers and process signal handling.

pub mod format;
pub mod signals;

pub use format::{format_hms, format_uptime};
pub use signals::shutdown_signal;
