//! Per-step stopwatches bound to the process timer

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use super::{
    stopwatch::{Stopwatch, StopwatchState},
    study::{Step, StepId, StudyStatus},
};
use crate::error::TimerError;

/// What a step timer needs to know about its parent before it may run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentContext {
    pub process_running: bool,
    pub study_status: StudyStatus,
}

#[derive(Debug)]
struct StepTimer {
    step: Step,
    stopwatch: Stopwatch,
    saving: bool,
}

impl StepTimer {
    fn new(step: Step) -> Self {
        let stopwatch = Stopwatch::with_saved(format!("step {}", step.id), step.actual_seconds);
        Self {
            step,
            stopwatch,
            saving: false,
        }
    }
}

/// Runtime view of one step timer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepTimerView {
    pub step_id: StepId,
    pub order: u32,
    pub name: String,
    pub estimated_seconds: Option<u64>,
    pub saving: bool,
    #[serde(flatten)]
    pub timer: StopwatchState,
}

/// One stopwatch per process step, keyed by step id.
///
/// A step timer only runs while the process timer runs. Stopping the process
/// timer force-stops every step and drops their unsaved time.
#[derive(Debug, Default)]
pub struct StepTimerSet {
    timers: BTreeMap<StepId, StepTimer>,
}

impl StepTimerSet {
    pub fn from_steps(steps: &[Step]) -> Self {
        let timers = steps
            .iter()
            .cloned()
            .map(|step| (step.id, StepTimer::new(step)))
            .collect();
        Self { timers }
    }

    fn timer_mut(&mut self, step_id: StepId) -> Result<&mut StepTimer, TimerError> {
        self.timers
            .get_mut(&step_id)
            .ok_or_else(|| TimerError::NotFound(format!("step {}", step_id)))
    }

    pub fn contains(&self, step_id: StepId) -> bool {
        self.timers.contains_key(&step_id)
    }

    pub fn is_running(&self, step_id: StepId) -> bool {
        self.timers
            .get(&step_id)
            .is_some_and(|t| t.stopwatch.is_running())
    }

    pub fn running_steps(&self) -> Vec<StepId> {
        self.timers
            .iter()
            .filter(|(_, t)| t.stopwatch.is_running())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Start a step timer.
    ///
    /// A step that already has a saved time is re-timed, which the caller must
    /// confirm through `confirm_re_time`.
    pub fn start(
        &mut self,
        step_id: StepId,
        parent: ParentContext,
        confirm_re_time: bool,
    ) -> Result<(), TimerError> {
        if parent.study_status.is_terminal() {
            return Err(TimerError::StudyFinalized(parent.study_status.to_string()));
        }
        let timer = self.timer_mut(step_id)?;
        if !parent.process_running {
            return Err(TimerError::ProcessNotRunning);
        }
        if timer.saving {
            return Err(TimerError::TransitionInFlight);
        }
        if timer.stopwatch.is_running() {
            return Err(TimerError::InvalidTransition(format!(
                "step {} is already running",
                step_id
            )));
        }

        if timer.stopwatch.is_completed() {
            if !confirm_re_time {
                return Err(TimerError::InvalidTransition(format!(
                    "step {} already has a saved time; re-timing must be confirmed",
                    step_id
                )));
            }
            timer.stopwatch.re_time()?;
            info!("Re-timing step {} (saved {:?}s)", step_id, timer.stopwatch.saved_baseline());
        }

        timer.stopwatch.start(true)
    }

    /// Force-stop every running step without persisting anything.
    ///
    /// Returns the ids of the steps that were stopped.
    pub fn on_parent_stopped(&mut self) -> Vec<StepId> {
        let mut stopped = Vec::new();
        for (id, timer) in self.timers.iter_mut() {
            if timer.stopwatch.is_running() {
                let partial = timer.stopwatch.stop();
                timer.stopwatch.discard_unsaved();
                debug!("Discarded {}s of unsaved time on step {}", partial, id);
                stopped.push(*id);
            }
        }
        if !stopped.is_empty() {
            info!("Process timer stopped, force-stopped steps {:?}", stopped);
        }
        stopped
    }

    /// Mark a step as saving and return the seconds to persist.
    ///
    /// The stopwatch keeps running until the backend confirms the save. A
    /// stopped step may be saved only while it still holds unsaved time.
    pub fn begin_save(&mut self, step_id: StepId) -> Result<u64, TimerError> {
        let timer = self.timer_mut(step_id)?;
        if timer.saving {
            return Err(TimerError::TransitionInFlight);
        }
        if !timer.stopwatch.is_running() && !timer.stopwatch.has_unsaved_time() {
            return Err(TimerError::InvalidTransition(format!(
                "step {} has no unsaved time",
                step_id
            )));
        }

        let seconds = timer.stopwatch.elapsed_seconds();
        timer.saving = true;
        Ok(seconds)
    }

    /// Apply the backend's answer to a step save.
    ///
    /// On success the server's `actual_time` wins, falling back to the value
    /// sent when the response omits it, and the stopwatch stops. On failure
    /// the stopwatch is left exactly as it was.
    pub fn resolve_save(
        &mut self,
        step_id: StepId,
        sent_seconds: u64,
        outcome: Result<Step, TimerError>,
    ) -> Result<Step, TimerError> {
        let timer = self.timer_mut(step_id)?;
        timer.saving = false;

        let mut saved = outcome?;
        let confirmed = saved.actual_seconds.unwrap_or(sent_seconds);
        saved.actual_seconds = Some(confirmed);
        timer.stopwatch.stop();
        timer.stopwatch.mark_saved(confirmed);
        timer.step = saved.clone();
        Ok(saved)
    }

    /// Rebuild from a fresh list of steps, keeping timers that are busy
    pub fn reload(&mut self, steps: &[Step]) {
        let mut previous = std::mem::take(&mut self.timers);
        for step in steps {
            let timer = match previous.remove(&step.id) {
                Some(mut busy) if busy.stopwatch.is_running() || busy.saving => {
                    busy.step = step.clone();
                    busy
                }
                _ => StepTimer::new(step.clone()),
            };
            self.timers.insert(step.id, timer);
        }
        for (id, mut dropped) in previous {
            dropped.stopwatch.stop();
            debug!("Step {} no longer part of the study", id);
        }
    }

    /// Step timers in step order
    pub fn views(&self) -> Vec<StepTimerView> {
        let mut views: Vec<StepTimerView> = self
            .timers
            .values()
            .map(|t| StepTimerView {
                step_id: t.step.id,
                order: t.step.order,
                name: t.step.name.clone(),
                estimated_seconds: t.step.estimated_seconds,
                saving: t.saving,
                timer: t.stopwatch.state(),
            })
            .collect();
        views.sort_by_key(|v| v.order);
        views
    }
}
