//! Capped exponential backoff for reconnecting after an unintended close.

use crate::timer::Timer;
use log::{debug, error};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Retry bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectContext {
    /// Retries scheduled since the last successful open
    pub attempt_count: u32,

    /// Retry budget
    pub max_attempts: u32,

    /// Delay of the first retry (ms)
    pub base_delay_ms: u64,
}

impl ReconnectContext {
    /// Create a fresh context. `max_attempts` is raised to at least 1.
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            attempt_count: 0,
            max_attempts: max_attempts.max(1),
            base_delay_ms,
        }
    }

    /// Whether the budget is used up
    pub fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

impl Default for ReconnectContext {
    fn default() -> Self {
        Self::new(
            crate::DEFAULT_MAX_RECONNECT_ATTEMPTS,
            crate::DEFAULT_RECONNECT_BASE_DELAY_MS,
        )
    }
}

/// Outcome of asking the policy for a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// A retry timer is armed
    Scheduled {
        /// 1-based number of the retry
        attempt: u32,
        /// Time until the retry fires
        delay: Duration,
    },

    /// Budget used up, nothing armed
    Exhausted {
        /// Retries made before giving up
        attempts: u32,
    },
}

/// Reconnect scheduler owning the single-shot retry timer
#[derive(Debug)]
pub struct ReconnectPolicy {
    context: ReconnectContext,
    max_backoff_factor: u32,
    generation: u64,
    timer: Option<Timer>,
}

impl ReconnectPolicy {
    /// Create a policy
    pub fn new(context: ReconnectContext, max_backoff_factor: u32) -> Self {
        Self {
            context,
            max_backoff_factor: max_backoff_factor.max(1),
            generation: 0,
            timer: None,
        }
    }

    /// Current bookkeeping
    pub fn context(&self) -> ReconnectContext {
        self.context
    }

    /// Retries scheduled since the last reset
    pub fn attempt_count(&self) -> u32 {
        self.context.attempt_count
    }

    /// Delay before the retry made with `attempt_count` previous retries:
    /// `min(2^attempt_count, max_backoff_factor) * base_delay_ms`
    pub fn delay_for(&self, attempt_count: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt_count)
            .unwrap_or(u32::MAX)
            .min(self.max_backoff_factor);
        Duration::from_millis(self.context.base_delay_ms.saturating_mul(u64::from(factor)))
    }

    /// Arm the retry timer, or report exhaustion.
    ///
    /// `due` builds the event posted when the timer fires from the timer's
    /// generation.
    pub fn schedule<E, F>(&mut self, tx: UnboundedSender<E>, due: F) -> ReconnectDecision
    where
        E: Send + 'static,
        F: FnOnce(u64) -> E,
    {
        if self.context.is_exhausted() {
            error!(
                "Giving up after {} reconnect attempts",
                self.context.attempt_count
            );
            return ReconnectDecision::Exhausted {
                attempts: self.context.attempt_count,
            };
        }

        let delay = self.delay_for(self.context.attempt_count);
        self.context.attempt_count += 1;
        self.generation += 1;
        self.timer = Some(Timer::once(delay, tx, due(self.generation)));

        debug!(
            "Reconnect attempt {}/{} in {:?}",
            self.context.attempt_count, self.context.max_attempts, delay
        );
        ReconnectDecision::Scheduled {
            attempt: self.context.attempt_count,
            delay,
        }
    }

    /// Claim a fired timer. True only for the currently armed generation,
    /// which is then disarmed.
    pub fn accepts(&mut self, generation: u64) -> bool {
        if self.timer.is_some() && generation == self.generation {
            self.timer = None;
            true
        } else {
            false
        }
    }

    /// Whether a retry timer is armed
    pub fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    /// Disarm a pending retry without touching the counter
    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
            debug!("Pending reconnect cancelled");
        }
    }

    /// Disarm and zero the counter
    pub fn reset(&mut self) {
        self.cancel();
        self.context.attempt_count = 0;
    }
}
