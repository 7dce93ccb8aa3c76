//! Error taxonomy for timer and session operations

use thiserror::Error;

/// Every failure the timer engine can report.
///
/// Local precondition failures (`InvalidTransition`, `ProcessNotRunning`,
/// `Validation`, `StudyFinalized`, `TransitionInFlight`) are raised before any
/// remote call is made. `Transport` and `NotFound` come from the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("process timer is not running")]
    ProcessNotRunning,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("study is already {0}")]
    StudyFinalized(String),

    #[error("a status change is already awaiting confirmation")]
    TransitionInFlight,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TimerError {
    /// Short machine-readable name used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            TimerError::InvalidTransition(_) => "invalid_transition",
            TimerError::ProcessNotRunning => "process_not_running",
            TimerError::Validation(_) => "validation_error",
            TimerError::StudyFinalized(_) => "study_finalized",
            TimerError::TransitionInFlight => "transition_in_flight",
            TimerError::Transport(_) => "transport_error",
            TimerError::NotFound(_) => "not_found",
            TimerError::Internal(_) => "internal",
        }
    }

    /// True for failures that originate from the remote side
    pub fn is_remote(&self) -> bool {
        matches!(self, TimerError::Transport(_) | TimerError::NotFound(_))
    }
}

impl From<reqwest::Error> for TimerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TimerError::Transport(format!("request timed out: {}", e))
        } else {
            TimerError::Transport(e.to_string())
        }
    }
}
