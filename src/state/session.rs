//! Study session state machine
//!
//! A session mirrors one time study and owns its process and step timers.
//! Status changes are two-phase: a synchronous `begin_*` call checks
//! preconditions, applies any optimistic change and returns a ticket; the
//! caller performs the remote call; `resolve` then adopts the server's answer
//! or rolls back. While a ticket is outstanding the session reports
//! `pending_confirmation` and rejects overlapping transitions.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{
    step_timers::{ParentContext, StepTimerSet, StepTimerView},
    stopwatch::{Stopwatch, StopwatchState},
    study::{Step, StepId, StudyId, StudyPatch, StudyStatus, TimeStudy},
};
use crate::{error::TimerError, services::RemoteSync};

/// Which status change a pending ticket belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Start,
    StopAndSave,
    Scrap,
}

/// An issued but unresolved study status change
#[derive(Debug)]
#[must_use = "a pending transition must be resolved"]
pub struct PendingTransition {
    pub kind: TransitionKind,
    pub study_id: StudyId,
    pub patch: StudyPatch,
    prior_status: StudyStatus,
    process_was_running: bool,
}

/// An issued but unresolved step time save
#[derive(Debug)]
#[must_use = "a pending step save must be resolved"]
pub struct PendingStepSave {
    pub study_id: StudyId,
    pub step_id: StepId,
    pub seconds: u64,
}

/// Serializable view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudySessionState {
    pub study_id: StudyId,
    pub name: String,
    pub status: StudyStatus,
    pub actual_total_seconds: Option<u64>,
    pub notes: Option<String>,
    pub pending_confirmation: bool,
    pub pending_transition: Option<TransitionKind>,
    pub process: StopwatchState,
    pub steps: Vec<StepTimerView>,
}

#[derive(Debug)]
pub struct StudySession {
    study: TimeStudy,
    pending: Option<TransitionKind>,
    process: Stopwatch,
    steps: StepTimerSet,
}

impl StudySession {
    /// Open a session on a study fetched from the backend
    pub fn new(study: TimeStudy) -> Result<Self, TimerError> {
        study.validate()?;
        let process = Stopwatch::with_saved(
            format!("process timer for study {}", study.id),
            study.actual_total_seconds,
        );
        let steps = StepTimerSet::from_steps(&study.steps);
        Ok(Self {
            study,
            pending: None,
            process,
            steps,
        })
    }

    pub fn study(&self) -> &TimeStudy {
        &self.study
    }

    pub fn id(&self) -> StudyId {
        self.study.id
    }

    pub fn status(&self) -> StudyStatus {
        self.study.status
    }

    pub fn pending_confirmation(&self) -> bool {
        self.pending.is_some()
    }

    pub fn process_running(&self) -> bool {
        self.process.is_running()
    }

    pub fn process_elapsed(&self) -> u64 {
        self.process.elapsed_seconds()
    }

    pub fn state(&self) -> StudySessionState {
        StudySessionState {
            study_id: self.study.id,
            name: self.study.name.clone(),
            status: self.study.status,
            actual_total_seconds: self.study.actual_total_seconds,
            notes: self.study.notes.clone(),
            pending_confirmation: self.pending.is_some(),
            pending_transition: self.pending,
            process: self.process.state(),
            steps: self.steps.views(),
        }
    }

    fn ensure_not_final(&self) -> Result<(), TimerError> {
        if self.study.status.is_terminal() {
            return Err(TimerError::StudyFinalized(self.study.status.to_string()));
        }
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), TimerError> {
        match self.pending {
            Some(_) => Err(TimerError::TransitionInFlight),
            None => Ok(()),
        }
    }

    fn parent_context(&self) -> ParentContext {
        ParentContext {
            process_running: self.process.is_running(),
            study_status: self.study.status,
        }
    }

    /// Stop the process timer and every step timer
    fn halt_timers(&mut self) -> u64 {
        let elapsed = self.process.stop();
        self.steps.on_parent_stopped();
        elapsed
    }

    /// Begin moving the study to in progress.
    ///
    /// Returns `None` when the study is already in progress: re-entrant start
    /// needs no remote call. Otherwise the status flips to in progress right
    /// away so the process timer may run while the backend confirms.
    pub fn begin_start(&mut self) -> Result<Option<PendingTransition>, TimerError> {
        self.ensure_not_final()?;
        self.ensure_idle()?;

        if self.study.status == StudyStatus::InProgress {
            debug!("Study {} already in progress, start is a no-op", self.study.id);
            return Ok(None);
        }

        let ticket = PendingTransition {
            kind: TransitionKind::Start,
            study_id: self.study.id,
            patch: StudyPatch::start(),
            prior_status: self.study.status,
            process_was_running: self.process.is_running(),
        };
        self.study.status = StudyStatus::InProgress;
        self.pending = Some(TransitionKind::Start);
        info!("Study {} optimistically marked in progress", self.study.id);
        Ok(Some(ticket))
    }

    /// Begin completing the study with the given total time.
    ///
    /// Blank notes fall back to the study's existing notes. Running timers are
    /// stopped and are not resumed if the save fails.
    pub fn begin_stop_and_save(
        &mut self,
        elapsed_seconds: u64,
        notes: Option<String>,
    ) -> Result<PendingTransition, TimerError> {
        self.check_completable()?;
        self.halt_timers();
        Ok(self.completion_ticket(elapsed_seconds, notes))
    }

    /// Like `begin_stop_and_save`, taking the total from the process timer as
    /// it stops
    pub fn begin_stop_process_and_save(
        &mut self,
        notes: Option<String>,
    ) -> Result<PendingTransition, TimerError> {
        self.check_completable()?;
        let elapsed_seconds = self.halt_timers();
        Ok(self.completion_ticket(elapsed_seconds, notes))
    }

    fn check_completable(&self) -> Result<(), TimerError> {
        self.ensure_not_final()?;
        self.ensure_idle()?;
        if self.study.status != StudyStatus::InProgress {
            return Err(TimerError::InvalidTransition(format!(
                "study {} is {} and cannot be completed",
                self.study.id, self.study.status
            )));
        }
        Ok(())
    }

    fn completion_ticket(&mut self, elapsed_seconds: u64, notes: Option<String>) -> PendingTransition {
        let notes = notes
            .filter(|n| !n.trim().is_empty())
            .or_else(|| self.study.notes.clone());

        self.pending = Some(TransitionKind::StopAndSave);
        PendingTransition {
            kind: TransitionKind::StopAndSave,
            study_id: self.study.id,
            patch: StudyPatch::complete(elapsed_seconds, notes),
            prior_status: self.study.status,
            process_was_running: false,
        }
    }

    /// Begin scrapping the study. A non-blank reason is required.
    ///
    /// Timers keep running until the backend confirms; `adopt` halts them.
    pub fn begin_scrap(&mut self, reason: &str) -> Result<PendingTransition, TimerError> {
        self.ensure_not_final()?;
        self.ensure_idle()?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(TimerError::Validation("a scrap reason is required".to_string()));
        }

        let ticket = PendingTransition {
            kind: TransitionKind::Scrap,
            study_id: self.study.id,
            patch: StudyPatch::scrap(reason.to_string()),
            prior_status: self.study.status,
            process_was_running: self.process.is_running(),
        };
        self.pending = Some(TransitionKind::Scrap);
        Ok(ticket)
    }

    /// Apply the backend's answer to a pending transition.
    ///
    /// On success the server representation replaces local state. On failure
    /// the status returns to what it was before the transition began.
    pub fn resolve(
        &mut self,
        ticket: PendingTransition,
        outcome: Result<TimeStudy, TimerError>,
    ) -> Result<StudyStatus, TimerError> {
        self.pending = None;

        let accepted = outcome.and_then(|server| {
            if server.id != ticket.study_id {
                return Err(TimerError::Validation(format!(
                    "backend answered for study {} instead of {}",
                    server.id, ticket.study_id
                )));
            }
            server.validate()?;
            Ok(server)
        });

        match accepted {
            Ok(server) => {
                self.adopt(server);
                info!(
                    "Study {} {:?} confirmed, status now {}",
                    self.study.id, ticket.kind, self.study.status
                );
                Ok(self.study.status)
            }
            Err(e) => {
                warn!("Study {} {:?} failed: {}", ticket.study_id, ticket.kind, e);
                self.roll_back(&ticket);
                Err(e)
            }
        }
    }

    fn roll_back(&mut self, ticket: &PendingTransition) {
        self.study.status = ticket.prior_status;
        // Time counted under an unconfirmed start is dropped even if the
        // timer was stopped in the meantime
        if ticket.kind == TransitionKind::Start && !ticket.process_was_running {
            self.halt_timers();
            self.process.discard_unsaved();
            info!("Stopped process timer for study {} after failed start", self.study.id);
        }
    }

    /// Take the server representation as the new truth
    fn adopt(&mut self, server: TimeStudy) {
        self.steps.reload(&server.steps);
        self.study = server;

        if self.study.status != StudyStatus::InProgress && self.process.is_running() {
            self.halt_timers();
        }
        match self.study.actual_total_seconds {
            Some(total) => self.process.mark_saved(total),
            None if self.study.status != StudyStatus::InProgress => self.process.discard_unsaved(),
            None => {}
        }
    }

    /// Adopt a freshly fetched study outside of any transition
    pub fn reconcile(&mut self, fetched: TimeStudy) -> Result<(), TimerError> {
        self.ensure_idle()?;
        if fetched.id != self.study.id {
            return Err(TimerError::Validation(format!(
                "cannot reconcile study {} with study {}",
                self.study.id, fetched.id
            )));
        }
        fetched.validate()?;
        self.adopt(fetched);
        debug!("Study {} reconciled, status {}", self.study.id, self.study.status);
        Ok(())
    }

    /// Start the process timer. The study must be in progress, even if only
    /// optimistically.
    pub fn start_process_timer(&mut self) -> Result<(), TimerError> {
        self.ensure_not_final()?;
        if matches!(self.pending, Some(kind) if kind != TransitionKind::Start) {
            return Err(TimerError::TransitionInFlight);
        }
        if self.study.status != StudyStatus::InProgress {
            return Err(TimerError::InvalidTransition(format!(
                "study {} has not been started",
                self.study.id
            )));
        }
        self.process.start(true)
    }

    /// Stop the process timer and force-stop all step timers.
    ///
    /// Returns the elapsed process time. Nothing is persisted.
    pub fn stop_process_timer(&mut self) -> Result<u64, TimerError> {
        self.ensure_not_final()?;
        Ok(self.halt_timers())
    }

    /// Zero the process timer locally. Never persists.
    ///
    /// Callers must obtain the user's confirmation first.
    pub fn reset_process_timer(&mut self) -> Result<(), TimerError> {
        self.ensure_not_final()?;
        self.ensure_idle()?;
        self.process.reset_local()
    }

    pub fn start_step(&mut self, step_id: StepId, confirm_re_time: bool) -> Result<(), TimerError> {
        let parent = self.parent_context();
        self.steps.start(step_id, parent, confirm_re_time)
    }

    /// Stop a step timer and hand back the time to persist
    pub fn begin_step_save(&mut self, step_id: StepId) -> Result<PendingStepSave, TimerError> {
        self.ensure_not_final()?;
        if self.study.status != StudyStatus::InProgress {
            return Err(TimerError::InvalidTransition(format!(
                "study {} is {}; step times can only be saved while in progress",
                self.study.id, self.study.status
            )));
        }
        let seconds = self.steps.begin_save(step_id)?;
        Ok(PendingStepSave {
            study_id: self.study.id,
            step_id,
            seconds,
        })
    }

    pub fn resolve_step_save(
        &mut self,
        ticket: PendingStepSave,
        outcome: Result<Step, TimerError>,
    ) -> Result<Step, TimerError> {
        let saved = self
            .steps
            .resolve_save(ticket.step_id, ticket.seconds, outcome)
            .inspect_err(|e| warn!("Saving step {} failed: {}", ticket.step_id, e))?;
        self.study.replace_step(saved.clone());
        info!("Step {} saved with {}s", saved.id, ticket.seconds);
        Ok(saved)
    }

    pub async fn request_start(&mut self, remote: &dyn RemoteSync) -> Result<StudyStatus, TimerError> {
        match self.begin_start()? {
            None => Ok(self.study.status),
            Some(ticket) => {
                let outcome = remote.update_study(ticket.study_id, &ticket.patch).await;
                self.resolve(ticket, outcome)
            }
        }
    }

    pub async fn request_stop_and_save(
        &mut self,
        remote: &dyn RemoteSync,
        elapsed_seconds: u64,
        notes: Option<String>,
    ) -> Result<StudyStatus, TimerError> {
        let ticket = self.begin_stop_and_save(elapsed_seconds, notes)?;
        let outcome = remote.update_study(ticket.study_id, &ticket.patch).await;
        self.resolve(ticket, outcome)
    }

    pub async fn request_scrap(
        &mut self,
        remote: &dyn RemoteSync,
        reason: &str,
    ) -> Result<StudyStatus, TimerError> {
        let ticket = self.begin_scrap(reason)?;
        let outcome = remote.update_study(ticket.study_id, &ticket.patch).await;
        self.resolve(ticket, outcome)
    }

    pub async fn save_step(&mut self, remote: &dyn RemoteSync, step_id: StepId) -> Result<Step, TimerError> {
        let ticket = self.begin_step_save(step_id)?;
        let outcome = remote.save_step_time(ticket.step_id, ticket.seconds).await;
        self.resolve_step_save(ticket, outcome)
    }
}
