//! Countdown implementation.
//!
//! The countdown is a wall-clock-based state machine. It does not use
//! internal threads - the caller passes the current instant to every
//! command and calls `tick()` periodically.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> Paused -> (Completed | Cancelled)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut countdown = Countdown::default();
//! countdown.start(Duration::from_secs(300), Instant::now())?;
//! // In a loop:
//! countdown.tick(Instant::now()); // Some(Completed) exactly once
//! ```

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountdownState {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
}

/// Output of [`Countdown::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CountdownSignal {
    Tick { remaining: Duration },
    /// Remaining time dropped to the warning threshold. Emitted once per arm.
    EndingSoon { remaining: Duration },
    Completed,
}

/// Single countdown.
///
/// Operates on wall-clock deltas -- no internal thread.
#[derive(Debug, Clone, Default)]
pub struct Countdown {
    state: CountdownState,
    total: Duration,
    remaining: Duration,
    /// Instant the remaining time was last flushed at (running only).
    last_flush: Option<Instant>,
    warning: Option<Duration>,
    warned: bool,
}

impl Countdown {
    /// Countdown that emits one `EndingSoon` when `threshold` is reached.
    pub fn with_warning(threshold: Duration) -> Self {
        Self {
            warning: (!threshold.is_zero()).then_some(threshold),
            ..Self::default()
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == CountdownState::Running
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    /// Remaining time as of the last command or tick.
    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Remaining time at `now` without mutating the countdown.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        match self.last_flush {
            Some(last) => self.remaining.saturating_sub(now.saturating_duration_since(last)),
            None => self.remaining,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.total.saturating_sub(self.remaining)
    }

    /// 0.0 .. 1.0 progress.
    pub fn progress(&self) -> f64 {
        if self.total.is_zero() {
            return 0.0;
        }
        1.0 - self.remaining.as_secs_f64() / self.total.as_secs_f64()
    }

    /// Next instant at which `tick` would produce a non-`Tick` signal.
    pub fn next_deadline(&self) -> Option<Instant> {
        let last = self.last_flush?;
        let end = last + self.remaining;
        match self.warning {
            Some(threshold) if !self.warned && self.remaining > threshold => {
                Some(last + (self.remaining - threshold))
            }
            _ => Some(end),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start (or restart) counting down `duration` from `now`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDuration` if `duration` is zero.
    pub fn start(&mut self, duration: Duration, now: Instant) -> Result<()> {
        if duration.is_zero() {
            return Err(CoreError::non_positive("countdown", duration));
        }
        self.state = CountdownState::Running;
        self.total = duration;
        self.remaining = duration;
        self.last_flush = Some(now);
        self.warned = self.warning.is_some_and(|w| duration <= w);
        Ok(())
    }

    /// No-op unless running.
    pub fn pause(&mut self, now: Instant) -> bool {
        if self.state != CountdownState::Running {
            return false;
        }
        self.flush(now);
        self.state = CountdownState::Paused;
        self.last_flush = None;
        true
    }

    /// No-op unless paused.
    pub fn resume(&mut self, now: Instant) -> bool {
        if self.state != CountdownState::Paused {
            return false;
        }
        self.state = CountdownState::Running;
        self.last_flush = Some(now);
        true
    }

    /// Suppress a completion not yet fired.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            CountdownState::Running | CountdownState::Paused => {
                self.state = CountdownState::Cancelled;
                self.last_flush = None;
                true
            }
            _ => false,
        }
    }

    /// Push the end back by `by`; re-arms the warning if it moves out of range.
    pub fn extend(&mut self, by: Duration, now: Instant) -> bool {
        if !matches!(self.state, CountdownState::Running | CountdownState::Paused) {
            return false;
        }
        self.flush(now);
        self.total += by;
        self.remaining += by;
        if let Some(threshold) = self.warning {
            self.warned = self.remaining <= threshold;
        }
        true
    }

    /// Call periodically. Returns `Some(Completed)` exactly once.
    pub fn tick(&mut self, now: Instant) -> Option<CountdownSignal> {
        if self.state != CountdownState::Running {
            return None;
        }
        self.flush(now);
        if self.remaining.is_zero() {
            self.state = CountdownState::Completed;
            self.last_flush = None;
            return Some(CountdownSignal::Completed);
        }
        if let Some(threshold) = self.warning {
            if !self.warned && self.remaining <= threshold {
                self.warned = true;
                return Some(CountdownSignal::EndingSoon {
                    remaining: self.remaining,
                });
            }
        }
        Some(CountdownSignal::Tick {
            remaining: self.remaining,
        })
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn flush(&mut self, now: Instant) {
        if let Some(last) = self.last_flush {
            let elapsed = now.saturating_duration_since(last);
            self.remaining = self.remaining.saturating_sub(elapsed);
            self.last_flush = Some(now);
        }
    }
}

/// Render `MM:SS`, or `HH:MM:SS` from one hour up.
pub fn format_clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
