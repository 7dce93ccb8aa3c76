//! Clock ticker background task

use std::time::Duration;

use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{interval_at, Instant},
};
use tracing::debug;

use crate::error::TimerError;

/// Emits one tick per period on a tokio task while enabled.
///
/// A ticker belongs to exactly one stopwatch. Dropping it stops the task.
#[derive(Debug)]
pub struct ClockTicker {
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl ClockTicker {
    /// Ticker with the standard one-second period
    pub fn new() -> Self {
        Self::with_period(Duration::from_secs(1))
    }

    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            handle: None,
        }
    }

    /// Start invoking `on_tick` once per period.
    ///
    /// Returns `Ok(false)` without touching the running task when already
    /// enabled. The first tick arrives one full period after this call.
    pub fn enable<F>(&mut self, mut on_tick: F) -> Result<bool, TimerError>
    where
        F: FnMut() + Send + 'static,
    {
        if self.is_enabled() {
            return Ok(false);
        }

        let runtime = Handle::try_current()
            .map_err(|e| TimerError::Internal(format!("clock ticker needs a tokio runtime: {}", e)))?;

        let period = self.period;
        let handle = runtime.spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                on_tick();
            }
        });

        debug!("Clock ticker enabled ({}ms period)", period.as_millis());
        self.handle = Some(handle);
        Ok(true)
    }

    /// Stop ticking. Safe to call when already disabled.
    pub fn disable(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Clock ticker disabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Default for ClockTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ClockTicker {
    fn drop(&mut self) {
        self.disable();
    }
}
