//! Background tasks module
//!
//! The clock ticker that drives stopwatches and the session event logger.

pub mod event_log;
pub mod ticker;

// Re-export main types
pub use event_log::event_log_task;
pub use ticker::ClockTicker;
