//! Time Study Timer - A state-managed timer service for process time studies
//!
//! This library keeps locally ticking stopwatches for a time study and its
//! steps in sync with the authoritative study status held by a backend.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod state;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use api::create_router;
pub use config::Config;
pub use error::TimerError;
pub use services::{HttpRemoteSync, RemoteSync};
pub use state::{AppState, StudySession};
pub use utils::signals::shutdown_signal;
