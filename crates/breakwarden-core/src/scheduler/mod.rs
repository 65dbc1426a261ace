//! Break scheduler: turns a work duration into an ordered work/break plan.
//!
//! Planning is pure. A plan is produced once when a session starts and the
//! intervals already in it are never rewritten; extending a session only
//! appends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::policy::{Mode, ModeParameters};

/// Shortest task a session accepts.
pub const MIN_WORK_DURATION: Duration = Duration::from_secs(5 * 60);
/// Longest single plan or extension.
pub const MAX_WORK_DURATION: Duration = Duration::from_secs(480 * 60);

/// How breaks are allocated inside the work time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// Repeat the mode's (work interval, break) pair.
    #[default]
    Auto,
    /// A fixed number of equal breaks spread evenly.
    Manual { count: u32, duration: Duration },
    /// Breaks at fixed points of worked time matching the user's energy curve.
    Energy { pattern: EnergyPattern },
}

/// Daily energy curve used by [`Strategy::Energy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyPattern {
    #[default]
    Normal,
    MorningPerson,
    AfternoonSlump,
    NightOwl,
}

impl EnergyPattern {
    pub const ALL: [EnergyPattern; 4] = [
        EnergyPattern::Normal,
        EnergyPattern::MorningPerson,
        EnergyPattern::AfternoonSlump,
        EnergyPattern::NightOwl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EnergyPattern::Normal => "normal",
            EnergyPattern::MorningPerson => "morning_person",
            EnergyPattern::AfternoonSlump => "afternoon_slump",
            EnergyPattern::NightOwl => "night_owl",
        }
    }

    /// Minutes of work after which a break is due.
    pub fn break_marks(self) -> &'static [u64] {
        match self {
            EnergyPattern::Normal => &[25, 50, 75, 100],
            EnergyPattern::MorningPerson => &[20, 40, 70, 100],
            EnergyPattern::AfternoonSlump => &[30, 60, 90],
            EnergyPattern::NightOwl => &[35, 70, 105],
        }
    }
}

impl fmt::Display for EnergyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnergyPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        EnergyPattern::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown energy pattern '{s}' (expected normal, morning_person, afternoon_slump or night_owl)"
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalKind {
    Work,
    Break,
}

/// One slice of the plan, positioned relative to session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub offset: Duration,
    pub duration: Duration,
    pub kind: IntervalKind,
}

impl Interval {
    pub fn work(offset: Duration, duration: Duration) -> Self {
        Self { offset, duration, kind: IntervalKind::Work }
    }

    pub fn rest(offset: Duration, duration: Duration) -> Self {
        Self { offset, duration, kind: IntervalKind::Break }
    }

    pub fn end(&self) -> Duration {
        self.offset.saturating_add(self.duration)
    }

    pub fn is_break(&self) -> bool {
        self.kind == IntervalKind::Break
    }
}

/// Mandatory rest after the last work interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "duration", rename_all = "snake_case")]
pub enum ClosingRest {
    /// Strict mode.
    Cooldown(Duration),
    /// Focused mode, scaled by total work.
    EndBreak(Duration),
}

impl ClosingRest {
    pub fn duration(&self) -> Duration {
        match self {
            ClosingRest::Cooldown(d) | ClosingRest::EndBreak(d) => *d,
        }
    }
}

/// Ordered work/break intervals for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakPlan {
    pub mode: Mode,
    pub intervals: Vec<Interval>,
    pub closing_rest: Option<ClosingRest>,
}

impl BreakPlan {
    pub fn breaks(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter().filter(|i| i.is_break())
    }

    pub fn work_total(&self) -> Duration {
        self.intervals
            .iter()
            .filter(|i| !i.is_break())
            .fold(Duration::ZERO, |total, i| total.saturating_add(i.duration))
    }

    /// End of the last interval, excluding any closing rest.
    pub fn end(&self) -> Duration {
        self.intervals.last().map(Interval::end).unwrap_or_default()
    }

    /// First break starting at or after `elapsed`.
    pub fn next_break_after(&self, elapsed: Duration) -> Option<&Interval> {
        self.breaks().find(|b| b.offset >= elapsed)
    }

    /// Intervals must be contiguous, non-empty and start at zero.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPlan` naming the first offending interval.
    pub fn validate_offsets(&self) -> Result<()> {
        let mut expected = Duration::ZERO;
        for (i, interval) in self.intervals.iter().enumerate() {
            if interval.duration.is_zero() {
                return Err(CoreError::InvalidPlan(format!("interval {i} is empty")));
            }
            if interval.offset != expected {
                return Err(CoreError::InvalidPlan(format!(
                    "interval {i} starts at {:?}, expected {:?}",
                    interval.offset, expected
                )));
            }
            expected = interval.end();
        }
        Ok(())
    }

    /// Append an auto-planned extension after the current end.
    ///
    /// Existing intervals are untouched. A focused plan recomputes its
    /// end-break from the new work total.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDuration` for a zero extension, one longer than
    /// [`MAX_WORK_DURATION`], or one that would push the plan past the
    /// representable range. The plan is unchanged on error.
    pub fn extend(&mut self, extension: Duration, params: &ModeParameters) -> Result<()> {
        if extension.is_zero() {
            return Err(CoreError::non_positive("extension", extension));
        }
        if extension > MAX_WORK_DURATION {
            return Err(CoreError::InvalidDuration(format!(
                "extension of {}m exceeds the {}m limit",
                extension.as_secs() / 60,
                MAX_WORK_DURATION.as_secs() / 60
            )));
        }
        let base = self.end();
        let tail = plan(extension, params, &Strategy::Auto)?;
        base.checked_add(tail.end())
            .ok_or_else(|| CoreError::InvalidDuration("extended plan is too long".into()))?;
        self.intervals.extend(tail.intervals.into_iter().map(|mut i| {
            i.offset += base;
            i
        }));
        if let Some(ClosingRest::EndBreak(_)) = self.closing_rest {
            self.closing_rest = params
                .closing_rest(self.work_total())
                .map(ClosingRest::EndBreak);
        }
        Ok(())
    }
}

/// Build a plan for `total` of work under `params`.
///
/// # Errors
///
/// Returns `InvalidPlan` when `total` is zero or above [`MAX_WORK_DURATION`],
/// or when a manual or energy strategy is used in a mode without in-work
/// breaks or a manual strategy does not fit.
pub fn plan(total: Duration, params: &ModeParameters, strategy: &Strategy) -> Result<BreakPlan> {
    if total.is_zero() {
        return Err(CoreError::InvalidPlan("total duration must be positive".into()));
    }
    if total > MAX_WORK_DURATION {
        return Err(CoreError::InvalidPlan(format!(
            "total of {}m exceeds the {}m limit",
            total.as_secs() / 60,
            MAX_WORK_DURATION.as_secs() / 60
        )));
    }

    let intervals = if params.mode.has_breaks_during_work() {
        match strategy {
            Strategy::Auto => auto_intervals(total, params)?,
            Strategy::Manual { count, duration } => manual_intervals(total, *count, *duration)?,
            Strategy::Energy { pattern } => energy_intervals(total, params, *pattern),
        }
    } else {
        match strategy {
            Strategy::Auto => vec![Interval::work(Duration::ZERO, total)],
            Strategy::Manual { .. } | Strategy::Energy { .. } => {
                return Err(CoreError::InvalidPlan(format!(
                    "{} sessions have no breaks during work",
                    params.mode
                )));
            }
        }
    };

    let closing_rest = match params.mode {
        Mode::Flexible => None,
        Mode::Strict => params.closing_rest(total).map(ClosingRest::Cooldown),
        Mode::Focused => params.closing_rest(total).map(ClosingRest::EndBreak),
    };

    Ok(BreakPlan {
        mode: params.mode,
        intervals,
        closing_rest,
    })
}

fn auto_intervals(total: Duration, params: &ModeParameters) -> Result<Vec<Interval>> {
    let work = params
        .work_interval
        .filter(|w| !w.is_zero())
        .ok_or_else(|| CoreError::InvalidPlan(format!("{} mode has no work interval", params.mode)))?;
    let rest = params.break_duration;

    let mut intervals = Vec::new();
    let mut offset = Duration::ZERO;
    let mut remaining = total;
    loop {
        let chunk = work.min(remaining);
        intervals.push(Interval::work(offset, chunk));
        offset += chunk;
        remaining -= chunk;
        // A break is only placed when some work follows it.
        if remaining <= rest || rest.is_zero() {
            break;
        }
        intervals.push(Interval::rest(offset, rest));
        offset += rest;
        remaining -= rest;
    }
    Ok(intervals)
}

/// Breaks after the pattern's worked-time marks. As with the auto rhythm a
/// break needs work after it; the final work interval absorbs the rest.
fn energy_intervals(total: Duration, params: &ModeParameters, pattern: EnergyPattern) -> Vec<Interval> {
    let rest = params.break_duration;
    let mut intervals = Vec::new();
    let mut offset = Duration::ZERO;
    let mut worked = Duration::ZERO;
    let mut remaining = total;
    for &mark in pattern.break_marks() {
        let mark = Duration::from_secs(mark * 60);
        let chunk = mark.saturating_sub(worked);
        if chunk.is_zero() || chunk + rest >= remaining {
            break;
        }
        intervals.push(Interval::work(offset, chunk));
        intervals.push(Interval::rest(offset + chunk, rest));
        offset += chunk + rest;
        remaining -= chunk + rest;
        worked = mark;
    }
    intervals.push(Interval::work(offset, remaining));
    intervals
}

fn manual_intervals(total: Duration, count: u32, duration: Duration) -> Result<Vec<Interval>> {
    if count == 0 {
        return Ok(vec![Interval::work(Duration::ZERO, total)]);
    }
    if duration.is_zero() {
        return Err(CoreError::InvalidPlan("manual break duration must be positive".into()));
    }
    let breaks_total = duration
        .checked_mul(count)
        .filter(|b| *b < total)
        .ok_or_else(|| {
            CoreError::InvalidPlan(format!(
                "{count} breaks of {}m do not fit in {}m",
                duration.as_secs() / 60,
                total.as_secs() / 60
            ))
        })?;

    let work_total = total - breaks_total;
    let slots = u64::from(count) + 1;
    let base = Duration::from_secs(work_total.as_secs() / slots);
    if base.is_zero() {
        return Err(CoreError::InvalidPlan(
            "work segments between manual breaks would be empty".into(),
        ));
    }
    let first = work_total - base * count;

    let mut intervals = Vec::with_capacity(slots as usize * 2 - 1);
    let mut offset = Duration::ZERO;
    for slot in 0..slots {
        let chunk = if slot == 0 { first } else { base };
        intervals.push(Interval::work(offset, chunk));
        offset += chunk;
        if slot + 1 < slots {
            intervals.push(Interval::rest(offset, duration));
            offset += duration;
        }
    }
    Ok(intervals)
}
