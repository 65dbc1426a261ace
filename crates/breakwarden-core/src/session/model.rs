//! Task and session records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::policy::{Mode, Phase};
use crate::scheduler::{BreakPlan, Strategy, MAX_WORK_DURATION, MIN_WORK_DURATION};

/// Work the user asked for. Immutable once a session begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub duration: Duration,
    pub mode: Mode,
    #[serde(default)]
    pub strategy: Strategy,
    /// Explicit start/end the duration was derived from, if any.
    #[serde(default)]
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl Task {
    /// # Errors
    ///
    /// Returns `InvalidDuration` if `duration` is zero or outside
    /// [`MIN_WORK_DURATION`]..=[`MAX_WORK_DURATION`].
    pub fn new(
        name: impl Into<String>,
        duration: Duration,
        mode: Mode,
        strategy: Strategy,
    ) -> Result<Self> {
        if duration.is_zero() {
            return Err(CoreError::non_positive("task duration", duration));
        }
        if !(MIN_WORK_DURATION..=MAX_WORK_DURATION).contains(&duration) {
            return Err(CoreError::InvalidDuration(format!(
                "task duration must be between {} and {} minutes, got {}s",
                MIN_WORK_DURATION.as_secs() / 60,
                MAX_WORK_DURATION.as_secs() / 60,
                duration.as_secs()
            )));
        }
        Ok(Self {
            name: name.into(),
            duration,
            mode,
            strategy,
            window: None,
        })
    }

    /// Task spanning an explicit start and end time.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDuration` if `end` is not after `start` or the span
    /// is outside the task bounds.
    pub fn from_window(
        name: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        mode: Mode,
        strategy: Strategy,
    ) -> Result<Self> {
        let duration = (end - start).to_std().map_err(|_| {
            CoreError::InvalidDuration(format!("task ends at {end} before it starts at {start}"))
        })?;
        let mut task = Self::new(name, duration, mode, strategy)?;
        task.window = Some((start, end));
        Ok(task)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakOutcome {
    Taken,
    Snoozed,
    Skipped,
}

impl BreakOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakOutcome::Taken => "taken",
            BreakOutcome::Snoozed => "snoozed",
            BreakOutcome::Skipped => "skipped",
        }
    }
}

/// A planned break the session actually reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealizedBreak {
    /// Index of the break interval in the plan.
    pub interval: usize,
    pub planned_offset: Duration,
    pub planned_duration: Duration,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<BreakOutcome>,
}

/// One run of a task. Owned by the session manager until it is finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub task: Task,
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    pub phase: Phase,
    pub plan: BreakPlan,
    pub breaks: Vec<RealizedBreak>,
    pub breaks_taken: u32,
    pub breaks_snoozed: u32,
    pub breaks_skipped: u32,
    pub emergency_exits: u32,
    pub extended_count: u32,
    pub snooze_passes_remaining: u32,
    pub ended_at: Option<DateTime<Utc>>,
    pub quality_score: Option<f64>,
}

impl Session {
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn resolved_breaks(&self) -> u32 {
        self.breaks_taken + self.breaks_snoozed + self.breaks_skipped
    }

    /// Break currently on screen and not yet resolved.
    pub fn pending_break(&self) -> Option<&RealizedBreak> {
        self.breaks.last().filter(|b| b.outcome.is_none())
    }

    /// Every reached break is counted once resolved, and only the current
    /// break may still be unresolved.
    pub fn accounting_holds(&self) -> bool {
        let resolved = self.breaks.iter().filter(|b| b.outcome.is_some()).count() as u32;
        let pending = self.breaks.len() as u32 - resolved;
        let pending_ok = match pending {
            0 => true,
            1 => self.phase == Phase::BreakActive && self.pending_break().is_some(),
            _ => false,
        };
        resolved == self.resolved_breaks() && pending_ok
    }

    /// Quality as of now; the final value is stored on finalization.
    pub fn current_quality(&self) -> f64 {
        quality_score(
            self.breaks_taken,
            self.breaks_snoozed,
            self.breaks_skipped,
            self.emergency_exits,
        )
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let end = self.ended_at.unwrap_or(now);
        (end - self.started_at).to_std().unwrap_or_default()
    }
}

/// `taken / (taken + snoozed + skipped)` minus 0.2 per emergency exit,
/// clamped to `[0, 1]`. A session with no breaks scores 1.0 before penalties.
pub fn quality_score(taken: u32, snoozed: u32, skipped: u32, emergency_exits: u32) -> f64 {
    let reached = taken + snoozed + skipped;
    let base = if reached == 0 {
        1.0
    } else {
        f64::from(taken) / f64::from(reached)
    };
    (base - 0.2 * f64::from(emergency_exits)).clamp(0.0, 1.0)
}
