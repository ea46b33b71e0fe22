// ABOUTME: Timer facility shared by every connection in the fleet
//
// Provides one-shot and recurring callbacks on the injected runtime. Every
// armed timer is represented by an owning TimerHandle; cancelling (or
// dropping) the handle guarantees the callback never runs again. Once the
// facility's shutdown token fires, pending timers are released without
// invoking their callbacks and new timers are refused.

use std::ops::ControlFlow;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Errors reported by the timer facility
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// The facility is shutting down and no longer arms timers
    #[error("timer facility is shut down")]
    ShutDown,

    /// Recurring timers need a non-zero period
    #[error("recurring timer period must be non-zero")]
    ZeroPeriod,

    /// The deadline lies beyond what the clock can represent
    #[error("timer delay of {0:?} overflows the clock")]
    Overflow(Duration),
}

/// Schedules callbacks on the fleet runtime
#[derive(Debug, Clone)]
pub struct TimerFacility {
    runtime: Handle,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl TimerFacility {
    /// Create a facility that spawns onto `runtime`, registers its tasks
    /// with `tracker` and stops when `shutdown` is cancelled
    pub const fn new(runtime: Handle, tracker: TaskTracker, shutdown: CancellationToken) -> Self {
        Self {
            runtime,
            tracker,
            shutdown,
        }
    }

    /// Whether new timers can still be armed
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.tracker.is_closed()
    }

    /// Run `on_fire` once after `delay`
    ///
    /// # Errors
    /// Returns `TimerError::ShutDown` if the facility has stopped, or
    /// `TimerError::Overflow` if the deadline cannot be represented.
    pub fn once<F>(&self, delay: Duration, on_fire: F) -> Result<TimerHandle, TimerError>
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.is_running() {
            return Err(TimerError::ShutDown);
        }

        let deadline = deadline_after(delay)?;
        let cancel = self.shutdown.child_token();
        let token = cancel.clone();

        self.tracker.spawn_on(
            async move {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => on_fire(),
                }
            },
            &self.runtime,
        );

        Ok(TimerHandle { cancel })
    }

    /// Run `on_tick` every `period`, first tick one period from now
    ///
    /// The chain ends when the handle is cancelled, the facility shuts down,
    /// or the callback returns `ControlFlow::Break`.
    ///
    /// # Errors
    /// Returns `TimerError::ShutDown` if the facility has stopped,
    /// `TimerError::ZeroPeriod` for a zero period, or `TimerError::Overflow`
    /// if the first tick cannot be represented.
    pub fn every<F>(&self, period: Duration, mut on_tick: F) -> Result<TimerHandle, TimerError>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        if period.is_zero() {
            return Err(TimerError::ZeroPeriod);
        }
        if !self.is_running() {
            return Err(TimerError::ShutDown);
        }

        let start = deadline_after(period)?;
        let cancel = self.shutdown.child_token();
        let token = cancel.clone();

        self.tracker.spawn_on(
            async move {
                let mut ticker = tokio::time::interval_at(start, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;
                        () = token.cancelled() => break,
                        _ = ticker.tick() => {
                            if on_tick().is_break() {
                                break;
                            }
                        }
                    }
                }
            },
            &self.runtime,
        );

        Ok(TimerHandle { cancel })
    }
}

fn deadline_after(delay: Duration) -> Result<Instant, TimerError> {
    Instant::now()
        .checked_add(delay)
        .ok_or(TimerError::Overflow(delay))
}

/// Owning handle for an armed timer
///
/// Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    cancel: CancellationToken,
}

impl TimerHandle {
    /// Cancel the timer; its callback will not run afterwards
    pub fn cancel(self) {
        self.cancel.cancel();
    }

    /// Whether the timer was cancelled, directly or by facility shutdown
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
