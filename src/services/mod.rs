//! External collaborators module
//!
//! The remote sync adapter for the study backend and the CSV export.

pub mod export;
pub mod remote;

// Re-export main types
pub use export::study_to_csv;
pub use remote::{HttpRemoteSync, RemoteSync};
