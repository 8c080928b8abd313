//! Timer services run by the worker.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::context::Bus;
use super::handler::TimerCallback;
use super::registry::{TimerId, TimerKind};
use crate::error::{BusError, BusResult};

impl Bus {
    /// Run `callback` every `interval` until canceled.
    pub fn tick(&self, interval: Duration, callback: impl TimerCallback) -> BusResult<TimerId> {
        if interval.is_zero() {
            return Err(BusError::invalid_argument(
                "repeating timer needs a non-zero interval",
            ));
        }
        self.add_timer(TimerKind::Repeating { interval }, interval, Arc::new(callback))
    }

    /// Same as [`Bus::tick`].
    pub fn every(&self, interval: Duration, callback: impl TimerCallback) -> BusResult<TimerId> {
        self.tick(interval, callback)
    }

    /// Run `callback` once after `delay`. The id becomes invalid once it has
    /// fired.
    pub fn after(&self, delay: Duration, callback: impl TimerCallback) -> BusResult<TimerId> {
        self.add_timer(TimerKind::OneShot, delay, Arc::new(callback))
    }

    /// Same as [`Bus::cancel`].
    pub fn tick_del(&self, id: TimerId) -> bool {
        self.cancel(id)
    }

    /// Remove a timer. Returns false if it does not exist, including a
    /// one-shot that has already fired.
    ///
    /// A firing that is already under way still completes.
    pub fn cancel(&self, id: TimerId) -> bool {
        let removed = self.shared.registry.lock().remove_timer(id);
        if removed.is_some() {
            debug!(%id, "Timer canceled");
        }
        removed.is_some()
    }

    /// Wake the worker so it re-evaluates its timers now.
    pub fn trigger(&self) -> BusResult<()> {
        self.ensure_init()?;
        // A full queue wakes the worker anyway
        self.try_wake();
        Ok(())
    }

    /// Wake variant for contexts that must never block. It only tries the
    /// runtime lock, never touches the registry and never waits for queue
    /// space.
    ///
    /// Returns whether a wake was queued.
    pub fn trigger_from_isr(&self) -> bool {
        self.try_wake()
    }

    fn add_timer(
        &self,
        kind: TimerKind,
        delay: Duration,
        callback: Arc<dyn TimerCallback>,
    ) -> BusResult<TimerId> {
        self.ensure_init()?;
        let first_due = Instant::now()
            .checked_add(delay)
            .ok_or_else(|| BusError::invalid_argument("timer delay out of range"))?;
        let id = self
            .shared
            .registry
            .lock()
            .add_timer(kind, first_due, callback)?;
        debug!(%id, ?kind, ?delay, "Timer added");
        self.try_wake();
        Ok(id)
    }

    /// How long the worker may idle before the next timer is due.
    pub(crate) fn next_wait(&self) -> Duration {
        let config = self.config();
        self.shared
            .registry
            .lock()
            .next_wait(Instant::now(), config.min_wait(), config.max_idle())
    }

    /// Fire every due timer. Callbacks run after the registry lock is
    /// released, so they may add or cancel timers.
    pub(crate) fn run_due_timers(&self) {
        let due = self.shared.registry.lock().take_due(Instant::now());
        if due.is_empty() {
            return;
        }
        trace!(count = due.len(), "Running due timers");
        for callback in due {
            self.guard("timer", || callback.fire());
        }
    }
}
