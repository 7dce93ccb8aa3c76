//! State management module
//!
//! Study records, stopwatches, step timers, the study session state machine
//! and the application state that owns open sessions.

pub mod app_state;
pub mod session;
pub mod step_timers;
pub mod stopwatch;
pub mod study;

// Re-export main types
pub use app_state::{AppState, SessionEvent};
pub use session::{PendingStepSave, PendingTransition, StudySession, StudySessionState, TransitionKind};
pub use step_timers::{ParentContext, StepTimerSet, StepTimerView};
pub use stopwatch::{Stopwatch, StopwatchState};
pub use study::{Step, StepId, StudyId, StudyPatch, StudyStatus, TimeStudy};
