//! Cancellable timers that post events into a client's event queue.

use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Opaque handle to a running timer.
///
/// The timer is cancelled when the handle is cancelled or dropped. Events
/// already posted before cancellation stay in the queue, so receivers tag
/// them with a generation and discard stale ones.
#[derive(Debug)]
pub struct Timer {
    task: JoinHandle<()>,
}

impl Timer {
    /// Post `event` once after `delay`
    pub fn once<E>(delay: Duration, tx: UnboundedSender<E>, event: E) -> Self
    where
        E: Send + 'static,
    {
        let task = tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = tx.send(event);
        });
        Self { task }
    }

    /// Post `make()` every `period`, first one `period` from now
    pub fn repeating<E, F>(period: Duration, tx: UnboundedSender<E>, mut make: F) -> Self
    where
        E: Send + 'static,
        F: FnMut() -> E + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(make()).is_err() {
                    break;
                }
            }
        });
        Self { task }
    }

    /// Stop the timer
    pub fn cancel(self) {
        drop(self);
    }

    /// Whether the timer task has ended (fired once, or was cancelled)
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
