//! Stopwatch state and management

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::debug;

use crate::{error::TimerError, tasks::ClockTicker};

/// Runtime view of one stopwatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StopwatchState {
    pub elapsed_seconds: u64,
    pub running: bool,
    /// Last value confirmed persisted by the backend
    pub saved_baseline: Option<u64>,
    /// Set once a value was persisted, cleared by a re-time
    pub completed: bool,
}

/// Counter shared between a stopwatch and its ticker task
#[derive(Debug, Default)]
struct Counter {
    state: StopwatchState,
    /// Bumped on every start; ticks from an earlier run are ignored
    run: u64,
}

/// Apply one tick issued by the ticker of run `run`
fn tick(counter: &Mutex<Counter>, run: u64) {
    let mut counter = counter.lock().unwrap_or_else(PoisonError::into_inner);
    if counter.run == run && counter.state.running {
        counter.state.elapsed_seconds += 1;
    }
}

/// Counts elapsed seconds for one timed entity (the whole process or a step).
///
/// The counter is shared only with this stopwatch's own ticker task. Every
/// tick and every mutating call goes through the same lock, and a tick only
/// counts for the run that spawned it, so no tick can land after `stop` has
/// returned.
#[derive(Debug)]
pub struct Stopwatch {
    label: String,
    shared: Arc<Mutex<Counter>>,
    ticker: ClockTicker,
}

impl Stopwatch {
    /// Create a stopwatch with no saved time
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_ticker(label, None, ClockTicker::new())
    }

    /// Create a stopwatch seeded with a previously persisted value
    pub fn with_saved(label: impl Into<String>, saved: Option<u64>) -> Self {
        Self::with_ticker(label, saved, ClockTicker::new())
    }

    pub fn with_ticker(label: impl Into<String>, saved: Option<u64>, ticker: ClockTicker) -> Self {
        let state = StopwatchState {
            elapsed_seconds: saved.unwrap_or(0),
            running: false,
            saved_baseline: saved,
            completed: saved.is_some(),
        };
        Self {
            label: label.into(),
            shared: Arc::new(Mutex::new(Counter { state, run: 0 })),
            ticker,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counter> {
        // A poisoned counter is still a valid counter
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> StopwatchState {
        self.lock().state
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.lock().state.elapsed_seconds
    }

    pub fn is_running(&self) -> bool {
        self.lock().state.running
    }

    pub fn is_completed(&self) -> bool {
        self.lock().state.completed
    }

    pub fn saved_baseline(&self) -> Option<u64> {
        self.lock().state.saved_baseline
    }

    /// True when the counter holds time that was never confirmed persisted
    pub fn has_unsaved_time(&self) -> bool {
        let state = self.lock().state;
        state.elapsed_seconds != state.saved_baseline.unwrap_or(0)
    }

    /// Begin counting.
    ///
    /// `permitted` is the enclosing context's verdict: the study status for
    /// the process timer, the process timer for a step.
    pub fn start(&mut self, permitted: bool) -> Result<(), TimerError> {
        let run = {
            let mut counter = self.lock();
            if counter.state.running {
                return Err(TimerError::InvalidTransition(format!(
                    "{} is already running",
                    self.label
                )));
            }
            if !permitted {
                return Err(TimerError::InvalidTransition(format!(
                    "{} cannot run in the current context",
                    self.label
                )));
            }
            counter.state.running = true;
            counter.run += 1;
            counter.run
        };

        let shared = Arc::clone(&self.shared);
        let enabled = self.ticker.enable(move || tick(&shared, run));

        if let Err(e) = enabled {
            self.lock().state.running = false;
            return Err(e);
        }

        debug!("{} started at {}s", self.label, self.elapsed_seconds());
        Ok(())
    }

    /// Stop counting and return the elapsed seconds for the caller to persist
    pub fn stop(&mut self) -> u64 {
        self.ticker.disable();
        let mut counter = self.lock();
        let state = &mut counter.state;
        if state.running {
            state.running = false;
            debug!("{} stopped at {}s", self.label, state.elapsed_seconds);
        }
        state.elapsed_seconds
    }

    /// Zero the counter without touching remote storage.
    ///
    /// Callers must have the user's explicit confirmation before calling this.
    pub fn reset_local(&mut self) -> Result<(), TimerError> {
        let mut counter = self.lock();
        let state = &mut counter.state;
        if state.running {
            return Err(TimerError::InvalidTransition(format!(
                "{} must be stopped before it can be reset",
                self.label
            )));
        }
        state.elapsed_seconds = 0;
        Ok(())
    }

    /// Discard the saved value from view and allow a fresh timing session.
    ///
    /// The persisted value stays the durable record until the new session is
    /// saved with `mark_saved`.
    pub fn re_time(&mut self) -> Result<(), TimerError> {
        let mut counter = self.lock();
        let state = &mut counter.state;
        if state.running {
            return Err(TimerError::InvalidTransition(format!(
                "{} is running and cannot be re-timed",
                self.label
            )));
        }
        if state.saved_baseline.is_none() {
            return Err(TimerError::InvalidTransition(format!(
                "{} has no saved time to re-time",
                self.label
            )));
        }
        state.elapsed_seconds = 0;
        state.completed = false;
        Ok(())
    }

    /// Record a value the backend confirmed as persisted
    pub fn mark_saved(&mut self, seconds: u64) {
        let mut counter = self.lock();
        let state = &mut counter.state;
        state.saved_baseline = Some(seconds);
        state.completed = true;
        if !state.running {
            state.elapsed_seconds = seconds;
        }
    }

    /// Roll a stopped counter back to its last saved value
    pub fn discard_unsaved(&mut self) {
        let mut counter = self.lock();
        let state = &mut counter.state;
        if state.running {
            return;
        }
        state.elapsed_seconds = state.saved_baseline.unwrap_or(0);
        state.completed = state.saved_baseline.is_some();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn counts_only_while_running() {
        let mut stopwatch = Stopwatch::new("process timer");

        stopwatch.start(true).unwrap();
        sleep(Duration::from_millis(3_500)).await;
        assert_eq!(stopwatch.stop(), 3);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(stopwatch.elapsed_seconds(), 3);

        stopwatch.start(true).unwrap();
        sleep(Duration::from_millis(2_200)).await;
        assert_eq!(stopwatch.stop(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_never_decreases_while_running() {
        let mut stopwatch = Stopwatch::new("process timer");
        stopwatch.start(true).unwrap();

        let mut last = 0;
        for _ in 0..6 {
            sleep(Duration::from_millis(700)).await;
            let now = stopwatch.elapsed_seconds();
            assert!(now >= last);
            last = now;
        }
        assert_eq!(stopwatch.stop(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_rejected_when_running_or_forbidden() {
        let mut stopwatch = Stopwatch::new("step 1");

        let err = stopwatch.start(false).unwrap_err();
        assert!(matches!(err, TimerError::InvalidTransition(_)));
        assert!(!stopwatch.is_running());

        stopwatch.start(true).unwrap();
        assert!(matches!(stopwatch.start(true), Err(TimerError::InvalidTransition(_))));
        stopwatch.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let mut stopwatch = Stopwatch::new("step 1");
        assert_eq!(stopwatch.stop(), 0);

        stopwatch.start(true).unwrap();
        sleep(Duration::from_millis(1_500)).await;
        assert_eq!(stopwatch.stop(), 1);
        assert_eq!(stopwatch.stop(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_requires_a_stopped_stopwatch() {
        let mut stopwatch = Stopwatch::new("process timer");
        stopwatch.start(true).unwrap();
        sleep(Duration::from_millis(2_500)).await;

        assert!(stopwatch.reset_local().is_err());
        assert_eq!(stopwatch.elapsed_seconds(), 2);

        stopwatch.stop();
        stopwatch.reset_local().unwrap();
        assert_eq!(stopwatch.elapsed_seconds(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn late_tick_from_an_earlier_run_is_ignored() {
        let mut stopwatch = Stopwatch::new("process timer");
        stopwatch.start(true).unwrap();
        stopwatch.stop();
        stopwatch.start(true).unwrap();

        tick(&stopwatch.shared, 1);
        assert_eq!(stopwatch.elapsed_seconds(), 0);

        tick(&stopwatch.shared, 2);
        assert_eq!(stopwatch.elapsed_seconds(), 1);
        assert_eq!(stopwatch.stop(), 1);
    }

    #[test]
    fn re_time_needs_a_saved_value() {
        let mut fresh = Stopwatch::new("step 2");
        assert!(matches!(fresh.re_time(), Err(TimerError::InvalidTransition(_))));

        let mut saved = Stopwatch::with_saved("step 1", Some(90));
        assert!(saved.is_completed());
        assert_eq!(saved.elapsed_seconds(), 90);

        saved.re_time().unwrap();
        assert_eq!(saved.elapsed_seconds(), 0);
        assert!(!saved.is_completed());
        assert_eq!(saved.saved_baseline(), Some(90));
    }

    #[test]
    fn discard_unsaved_restores_the_baseline() {
        let mut stopwatch = Stopwatch::with_saved("step 1", Some(90));
        stopwatch.re_time().unwrap();
        stopwatch.discard_unsaved();

        assert_eq!(
            stopwatch.state(),
            StopwatchState {
                elapsed_seconds: 90,
                running: false,
                saved_baseline: Some(90),
                completed: true,
            }
        );
        assert!(!stopwatch.has_unsaved_time());
    }

    #[test]
    fn mark_saved_sets_the_new_baseline() {
        let mut stopwatch = Stopwatch::new("step 3");
        stopwatch.mark_saved(40);
        assert_eq!(stopwatch.saved_baseline(), Some(40));
        assert_eq!(stopwatch.elapsed_seconds(), 40);
        assert!(stopwatch.is_completed());
    }
}
