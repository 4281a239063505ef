//! Liveness probe scheduling while the connection is open.

use crate::timer::Timer;
use log::trace;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Shortest tick period a monitor accepts
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Periodic ping scheduler.
///
/// Owns at most one repeating [`Timer`]. Each start bumps the generation, so
/// ticks queued by an earlier run are recognised as stale by [`accepts`].
///
/// [`accepts`]: HeartbeatMonitor::accepts
#[derive(Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    generation: u64,
    timer: Option<Timer>,
}

impl HeartbeatMonitor {
    /// Create a stopped monitor. `interval` is raised to at least 1 ms.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            generation: 0,
            timer: None,
        }
    }

    /// Tick interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start ticking, replacing any running timer.
    ///
    /// `tick` builds the event posted on each tick from the run's generation.
    pub fn start<E, F>(&mut self, tx: UnboundedSender<E>, tick: F) -> u64
    where
        E: Send + 'static,
        F: Fn(u64) -> E + Send + 'static,
    {
        self.stop();
        self.generation += 1;
        let generation = self.generation;
        trace!("Heartbeat #{} started ({:?})", generation, self.interval);
        self.timer = Some(Timer::repeating(self.interval, tx, move || tick(generation)));
        generation
    }

    /// Stop ticking. Returns whether a timer was running.
    pub fn stop(&mut self) -> bool {
        match self.timer.take() {
            Some(timer) => {
                timer.cancel();
                trace!("Heartbeat #{} stopped", self.generation);
                true
            }
            None => false,
        }
    }

    /// Whether a timer is running
    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Whether a tick of `generation` belongs to the running timer
    pub fn accepts(&self, generation: u64) -> bool {
        self.timer.is_some() && generation == self.generation
    }
}
