//! Main application state management

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::{
    session::{StudySession, StudySessionState},
    study::{Step, StepId, StudyId, StudyStatus},
};
use crate::{
    error::TimerError,
    services::{export::study_to_csv, RemoteSync},
    utils::format_uptime,
};

/// Notification broadcast after every session action
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub study_id: StudyId,
    pub action: String,
    pub status: Option<StudyStatus>,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Owns every open study session and drives their remote round-trips.
///
/// The sessions lock is never held across an `.await`: each transition is
/// begun under the lock, the remote call runs unlocked, and the result is
/// resolved under the lock again.
pub struct AppState {
    sessions: Mutex<HashMap<StudyId, StudySession>>,
    remote: Arc<dyn RemoteSync>,
    /// Upper bound on any single remote call
    pub remote_timeout: Duration,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Last action tracking
    pub last_action: Arc<Mutex<Option<String>>>,
    pub last_action_time: Arc<Mutex<Option<DateTime<Utc>>>>,
    /// Channel for session event notifications
    pub event_tx: broadcast::Sender<SessionEvent>,
}

impl AppState {
    pub fn new(remote: Arc<dyn RemoteSync>, remote_timeout: Duration, port: u16, host: String) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            sessions: Mutex::new(HashMap::new()),
            remote,
            remote_timeout,
            start_time: Instant::now(),
            port,
            host,
            last_action: Arc::new(Mutex::new(None)),
            last_action_time: Arc::new(Mutex::new(None)),
            event_tx,
        }
    }

    /// Run `f` against one session under the sessions lock
    fn with_session<T, F>(&self, study_id: StudyId, f: F) -> Result<T, TimerError>
    where
        F: FnOnce(&mut StudySession) -> Result<T, TimerError>,
    {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| TimerError::Internal(format!("Failed to lock sessions: {}", e)))?;
        let session = sessions
            .get_mut(&study_id)
            .ok_or_else(|| TimerError::NotFound(format!("no open session for study {}", study_id)))?;
        f(session)
    }

    /// Await a remote call, treating expiry of the timeout as a transport failure
    async fn call_remote<T, F>(&self, call: F) -> Result<T, TimerError>
    where
        F: Future<Output = Result<T, TimerError>>,
    {
        match tokio::time::timeout(self.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TimerError::Transport(format!(
                "backend did not answer within {}s",
                self.remote_timeout.as_secs_f32()
            ))),
        }
    }

    /// Record the action and broadcast it to listeners
    fn notify<T>(&self, study_id: StudyId, action: &str, result: &Result<T, TimerError>) {
        if let Ok(mut last_action) = self.last_action.lock() {
            *last_action = Some(format!("{} study {}", action, study_id));
        }
        if let Ok(mut last_time) = self.last_action_time.lock() {
            *last_time = Some(Utc::now());
        }

        let status = self.with_session(study_id, |s| Ok(s.status())).ok();
        let event = SessionEvent {
            study_id,
            action: action.to_string(),
            status,
            error: result.as_ref().err().map(|e| e.to_string()),
            at: Utc::now(),
        };
        // No receivers is fine, the event log task may not be running
        let _ = self.event_tx.send(event);
    }

    pub fn snapshot(&self, study_id: StudyId) -> Result<StudySessionState, TimerError> {
        self.with_session(study_id, |s| Ok(s.state()))
    }

    pub fn open_studies(&self) -> Result<Vec<StudyId>, TimerError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|e| TimerError::Internal(format!("Failed to lock sessions: {}", e)))?;
        let mut ids: Vec<StudyId> = sessions.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Fetch a study and open a session for it, or refresh the open one
    pub async fn open_study(&self, study_id: StudyId) -> Result<StudySessionState, TimerError> {
        let result = self.open_study_inner(study_id).await;
        self.notify(study_id, "open", &result);
        result
    }

    async fn open_study_inner(&self, study_id: StudyId) -> Result<StudySessionState, TimerError> {
        let fetched = self.call_remote(self.remote.fetch_study(study_id)).await?;
        if fetched.id != study_id {
            return Err(TimerError::Validation(format!(
                "backend answered for study {} instead of {}",
                fetched.id, study_id
            )));
        }

        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| TimerError::Internal(format!("Failed to lock sessions: {}", e)))?;
        let state = match sessions.get_mut(&study_id) {
            Some(session) => {
                session.reconcile(fetched)?;
                session.state()
            }
            None => {
                let session = StudySession::new(fetched)?;
                let state = session.state();
                sessions.insert(study_id, session);
                info!("Opened session for study {} ({})", study_id, state.status);
                state
            }
        };
        Ok(state)
    }

    /// Move the study to in progress and start the process timer
    pub async fn start_process(&self, study_id: StudyId) -> Result<StudySessionState, TimerError> {
        let result = self.start_process_inner(study_id).await;
        self.notify(study_id, "start", &result);
        result
    }

    async fn start_process_inner(&self, study_id: StudyId) -> Result<StudySessionState, TimerError> {
        let ticket = self.with_session(study_id, |s| {
            let ticket = s.begin_start()?;
            if !s.process_running() {
                if let Err(e) = s.start_process_timer() {
                    if let Some(ticket) = ticket {
                        let _ = s.resolve(ticket, Err(e.clone()));
                    }
                    return Err(e);
                }
            }
            Ok(ticket)
        })?;

        if let Some(ticket) = ticket {
            let outcome = self
                .call_remote(self.remote.update_study(ticket.study_id, &ticket.patch))
                .await;
            self.with_session(study_id, |s| s.resolve(ticket, outcome))?;
        }
        self.snapshot(study_id)
    }

    /// Stop the process timer and save the study as completed
    pub async fn stop_and_save(
        &self,
        study_id: StudyId,
        notes: Option<String>,
    ) -> Result<StudySessionState, TimerError> {
        let result = self.stop_and_save_inner(study_id, notes).await;
        self.notify(study_id, "stop", &result);
        result
    }

    async fn stop_and_save_inner(
        &self,
        study_id: StudyId,
        notes: Option<String>,
    ) -> Result<StudySessionState, TimerError> {
        let ticket = self.with_session(study_id, |s| s.begin_stop_process_and_save(notes))?;
        let outcome = self
            .call_remote(self.remote.update_study(ticket.study_id, &ticket.patch))
            .await;
        self.with_session(study_id, |s| s.resolve(ticket, outcome))?;
        self.snapshot(study_id)
    }

    /// Scrap the study with a mandatory reason
    pub async fn scrap(&self, study_id: StudyId, reason: &str) -> Result<StudySessionState, TimerError> {
        let result = self.scrap_inner(study_id, reason).await;
        self.notify(study_id, "scrap", &result);
        result
    }

    async fn scrap_inner(&self, study_id: StudyId, reason: &str) -> Result<StudySessionState, TimerError> {
        let ticket = self.with_session(study_id, |s| s.begin_scrap(reason))?;
        let outcome = self
            .call_remote(self.remote.update_study(ticket.study_id, &ticket.patch))
            .await;
        self.with_session(study_id, |s| s.resolve(ticket, outcome))?;
        self.snapshot(study_id)
    }

    /// Zero the process timer locally once the user has confirmed
    pub fn reset_process(&self, study_id: StudyId, confirmed: bool) -> Result<StudySessionState, TimerError> {
        let result = if confirmed {
            self.with_session(study_id, |s| {
                s.reset_process_timer()?;
                Ok(s.state())
            })
        } else {
            Err(TimerError::Validation(
                "resetting the timer discards unsaved time and must be confirmed".to_string(),
            ))
        };
        self.notify(study_id, "reset", &result);
        result
    }

    pub fn start_step(
        &self,
        study_id: StudyId,
        step_id: StepId,
        confirm_re_time: bool,
    ) -> Result<StudySessionState, TimerError> {
        let result = self.with_session(study_id, |s| {
            s.start_step(step_id, confirm_re_time)?;
            Ok(s.state())
        });
        self.notify(study_id, &format!("start step {}", step_id), &result);
        result
    }

    /// Stop a step timer and persist its time
    pub async fn stop_step(&self, study_id: StudyId, step_id: StepId) -> Result<Step, TimerError> {
        let result = self.stop_step_inner(study_id, step_id).await;
        self.notify(study_id, &format!("stop step {}", step_id), &result);
        result
    }

    async fn stop_step_inner(&self, study_id: StudyId, step_id: StepId) -> Result<Step, TimerError> {
        let ticket = self.with_session(study_id, |s| s.begin_step_save(step_id))?;
        let outcome = self
            .call_remote(self.remote.save_step_time(ticket.step_id, ticket.seconds))
            .await;
        self.with_session(study_id, |s| s.resolve_step_save(ticket, outcome))
    }

    /// Render the session's current study as CSV
    pub fn export_csv(&self, study_id: StudyId) -> Result<Vec<u8>, TimerError> {
        let study = self.with_session(study_id, |s| Ok(s.study().clone()))?;
        study_to_csv(&study).inspect_err(|e| warn!("Export of study {} failed: {}", study_id, e))
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        format_uptime(self.start_time.elapsed().as_secs())
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let last_action = self.last_action.lock().ok().and_then(|a| a.clone());
        let last_action_time = self.last_action_time.lock().ok().and_then(|t| *t);
        (last_action, last_action_time)
    }
}
