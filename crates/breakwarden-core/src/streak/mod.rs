//! Streak ledger.
//!
//! Consumes finalized sessions and keeps three counters: consecutive
//! sessions without skipped breaks, consecutive perfect sessions, and
//! consecutive calendar days with at least one completed session.
//!
//! The ledger holds no state of its own. [`StreakState`] is owned by the
//! caller and passed into every call; [`SharedStreaks`] wraps it in a mutex
//! for concurrent recorders.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::policy::Phase;
use crate::session::Session;

/// Counts that trigger a milestone notification.
pub const MILESTONES: [u32; 8] = [5, 10, 25, 50, 100, 250, 500, 1000];

/// Days of applied session ids kept behind the newest recorded day.
pub const APPLIED_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakKind {
    Session,
    Perfect,
    Daily,
}

impl StreakKind {
    pub const ALL: [StreakKind; 3] = [StreakKind::Session, StreakKind::Perfect, StreakKind::Daily];

    pub fn as_str(self) -> &'static str {
        match self {
            StreakKind::Session => "session",
            StreakKind::Perfect => "perfect",
            StreakKind::Daily => "daily",
        }
    }

    fn unit(self, count: u32) -> &'static str {
        match (self, count) {
            (StreakKind::Daily, 1) => "day",
            (StreakKind::Daily, _) => "days",
            (StreakKind::Perfect, 1) => "perfect session",
            (StreakKind::Perfect, _) => "perfect sessions",
            (StreakKind::Session, 1) => "session",
            (StreakKind::Session, _) => "sessions",
        }
    }
}

impl FromStr for StreakKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        StreakKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| format!("unknown streak kind '{s}' (expected session, perfect or daily)"))
    }
}

/// Current and best value of one streak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakCounter {
    pub current: u32,
    pub best: u32,
}

impl StreakCounter {
    pub fn increment(&mut self) {
        self.current += 1;
        self.best = self.best.max(self.current);
    }

    pub fn reset(&mut self) {
        self.current = 0;
    }
}

/// Persistent streak bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    #[serde(default)]
    pub session: StreakCounter,
    #[serde(default)]
    pub perfect: StreakCounter,
    #[serde(default)]
    pub daily: StreakCounter,
    /// Calendar day of the last session that counted toward `daily`.
    #[serde(default)]
    pub last_activity_date: Option<NaiveDate>,
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Sessions already applied, with their calendar day. Recording one
    /// again is a no-op.
    #[serde(default)]
    pub applied: BTreeMap<Uuid, NaiveDate>,
    /// Ids dated before this day have been pruned from `applied`, so such
    /// sessions are no longer accepted.
    #[serde(default)]
    pub pruned_before: Option<NaiveDate>,
}

impl StreakState {
    pub fn counter(&self, kind: StreakKind) -> &StreakCounter {
        match kind {
            StreakKind::Session => &self.session,
            StreakKind::Perfect => &self.perfect,
            StreakKind::Daily => &self.daily,
        }
    }

    fn counter_mut(&mut self, kind: StreakKind) -> &mut StreakCounter {
        match kind {
            StreakKind::Session => &mut self.session,
            StreakKind::Perfect => &mut self.perfect,
            StreakKind::Daily => &mut self.daily,
        }
    }
}

/// Result of [`StreakLedger::record`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RecordOutcome {
    Applied { milestones: Vec<Milestone> },
    AlreadyRecorded,
    /// The session is older than the retained id history.
    Expired,
    /// The session has not reached a terminal phase.
    NotFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub kind: StreakKind,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakStatus {
    pub kind: StreakKind,
    pub current: u32,
    pub best: u32,
    pub active: bool,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakSummary {
    pub session: StreakStatus,
    pub perfect: StreakStatus,
    pub daily: StreakStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// How close the daily streak is to lapsing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRisk {
    pub level: RiskLevel,
    pub hours_since_activity: f64,
    pub hours_left: f64,
    pub message: String,
}

/// Stateless streak rules, parameterized by the calendar offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakLedger {
    offset: FixedOffset,
}

impl Default for StreakLedger {
    fn default() -> Self {
        Self::utc()
    }
}

impl StreakLedger {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    /// Apply a finalized session. Idempotent per session id.
    pub fn record(&self, state: &mut StreakState, session: &Session) -> RecordOutcome {
        if !session.is_terminal() {
            return RecordOutcome::NotFinished;
        }
        let finished_at = session.ended_at.unwrap_or(session.started_at);
        let day = self.day_of(finished_at);
        if state.applied.contains_key(&session.id) {
            tracing::debug!(session = %session.id, "session already recorded");
            return RecordOutcome::AlreadyRecorded;
        }
        if state.pruned_before.is_some_and(|horizon| day < horizon) {
            tracing::warn!(session = %session.id, %day, "session predates retained history");
            return RecordOutcome::Expired;
        }
        state.applied.insert(session.id, day);
        prune_applied(state);

        let before = (state.session.current, state.perfect.current, state.daily.current);

        let abandoned = session.phase == Phase::Abandoned;
        let clean = !abandoned && session.breaks_skipped == 0 && session.emergency_exits == 0;
        let perfect = clean && session.breaks_snoozed == 0;

        if clean {
            state.session.increment();
        } else {
            state.session.reset();
        }
        if perfect {
            state.perfect.increment();
        } else {
            state.perfect.reset();
        }

        if !abandoned {
            self.record_activity(state, finished_at);
        }

        let after = [
            (StreakKind::Session, before.0, state.session.current),
            (StreakKind::Perfect, before.1, state.perfect.current),
            (StreakKind::Daily, before.2, state.daily.current),
        ];
        let milestones = after
            .into_iter()
            .filter(|(_, old, new)| new > old && MILESTONES.contains(new))
            .map(|(kind, _, count)| Milestone { kind, count })
            .collect();

        tracing::info!(
            session = %session.id,
            session_streak = state.session.current,
            perfect_streak = state.perfect.current,
            daily_streak = state.daily.current,
            "streaks updated"
        );
        RecordOutcome::Applied { milestones }
    }

    fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    fn record_activity(&self, state: &mut StreakState, at: DateTime<Utc>) {
        let day = self.day_of(at);
        match state.last_activity_date {
            None => state.daily.increment(),
            Some(last) => match (day - last).num_days() {
                0 => {}
                1 => state.daily.increment(),
                n if n > 1 => {
                    state.daily.reset();
                    state.daily.increment();
                }
                // Older than the last counted day.
                _ => return,
            },
        }
        state.last_activity_date = Some(day);
        state.last_activity_at = Some(at);
    }

    pub fn status(&self, state: &StreakState, kind: StreakKind) -> StreakStatus {
        let counter = state.counter(kind);
        let display = if counter.current == 0 {
            format!("No active streak (best {})", counter.best)
        } else {
            format!(
                "{} {} (best {})",
                counter.current,
                kind.unit(counter.current),
                counter.best
            )
        };
        StreakStatus {
            kind,
            current: counter.current,
            best: counter.best,
            active: counter.current > 0,
            display,
        }
    }

    pub fn summary(&self, state: &StreakState) -> StreakSummary {
        StreakSummary {
            session: self.status(state, StreakKind::Session),
            perfect: self.status(state, StreakKind::Perfect),
            daily: self.status(state, StreakKind::Daily),
        }
    }

    /// The current count if it sits exactly on a milestone.
    pub fn milestone(&self, state: &StreakState, kind: StreakKind) -> Option<Milestone> {
        let count = state.counter(kind).current;
        MILESTONES
            .contains(&count)
            .then_some(Milestone { kind, count })
    }

    /// Risk of losing the daily streak. `None` when there is nothing to lose.
    pub fn daily_risk(&self, state: &StreakState, now: DateTime<Utc>) -> Option<DailyRisk> {
        let last = state.last_activity_at?;
        if state.daily.current == 0 {
            return None;
        }
        let hours_since = (now - last).num_seconds().max(0) as f64 / 3600.0;
        let hours_left = (24.0 - hours_since).max(0.0);
        let (level, message) = if hours_since > 18.0 {
            (
                RiskLevel::High,
                format!(
                    "Work in {}h or lose your {}-day streak",
                    hours_left as u32, state.daily.current
                ),
            )
        } else if hours_since > 12.0 {
            (
                RiskLevel::Medium,
                format!("{}h left to keep your streak", hours_left as u32),
            )
        } else {
            (RiskLevel::Low, "Streak is safe".to_string())
        };
        Some(DailyRisk {
            level,
            hours_since_activity: hours_since,
            hours_left,
            message,
        })
    }

    /// Reset one counter's current value (best is kept).
    pub fn reset(&self, state: &mut StreakState, kind: StreakKind) {
        state.counter_mut(kind).reset();
    }
}

/// Drop ids more than [`APPLIED_RETENTION_DAYS`] behind the newest one.
fn prune_applied(state: &mut StreakState) {
    let Some(newest) = state.applied.values().max().copied() else {
        return;
    };
    let horizon = newest - chrono::Duration::days(APPLIED_RETENTION_DAYS);
    if state.pruned_before.is_some_and(|h| h >= horizon) {
        return;
    }
    state.applied.retain(|_, day| *day >= horizon);
    state.pruned_before = Some(horizon);
}

/// Mutex-guarded streak state for concurrent recorders.
#[derive(Debug, Default)]
pub struct SharedStreaks {
    ledger: StreakLedger,
    state: Mutex<StreakState>,
}

impl SharedStreaks {
    pub fn new(ledger: StreakLedger, state: StreakState) -> Self {
        Self {
            ledger,
            state: Mutex::new(state),
        }
    }

    pub fn ledger(&self) -> &StreakLedger {
        &self.ledger
    }

    fn lock(&self) -> MutexGuard<'_, StreakState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record and return the outcome with a snapshot of the updated state.
    pub fn record(&self, session: &Session) -> (RecordOutcome, StreakState) {
        let mut state = self.lock();
        let outcome = self.ledger.record(&mut state, session);
        (outcome, state.clone())
    }

    pub fn snapshot(&self) -> StreakState {
        self.lock().clone()
    }

    pub fn summary(&self) -> StreakSummary {
        self.ledger.summary(&self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Mode, ModePolicy};
    use crate::scheduler::{self, Strategy};
    use crate::session::Task;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::time::Duration;

    fn finished(phase: Phase, ended_at: DateTime<Utc>, skipped: u32, snoozed: u32, exits: u32) -> Session {
        let policy = ModePolicy::default();
        let task = Task::new("t", Duration::from_secs(3600), Mode::Flexible, Strategy::Auto).unwrap();
        let plan = scheduler::plan(task.duration, policy.parameters(Mode::Flexible), &task.strategy).unwrap();
        Session {
            id: Uuid::new_v4(),
            mode: task.mode,
            task,
            started_at: ended_at - ChronoDuration::hours(1),
            phase,
            plan,
            breaks: Vec::new(),
            breaks_taken: 0,
            breaks_snoozed: snoozed,
            breaks_skipped: skipped,
            emergency_exits: exits,
            extended_count: 0,
            snooze_passes_remaining: 3,
            ended_at: Some(ended_at),
            quality_score: None,
        }
    }

    fn day(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, d, h, 0, 0).unwrap()
    }

    #[test]
    fn recording_twice_equals_once() {
        let ledger = StreakLedger::utc();
        let mut once = StreakState::default();
        let session = finished(Phase::Ended, day(1, 10), 0, 0, 0);
        ledger.record(&mut once, &session);
        let mut twice = once.clone();
        assert_eq!(ledger.record(&mut twice, &session), RecordOutcome::AlreadyRecorded);
        assert_eq!(once, twice);
    }

    #[test]
    fn unfinished_session_is_not_recorded() {
        let ledger = StreakLedger::utc();
        let mut state = StreakState::default();
        let session = finished(Phase::Working, day(1, 10), 0, 0, 0);
        assert_eq!(ledger.record(&mut state, &session), RecordOutcome::NotFinished);
        assert!(state.applied.is_empty());
    }

    #[test]
    fn skips_reset_session_streak_and_snoozes_reset_perfect() {
        let ledger = StreakLedger::utc();
        let mut state = StreakState::default();
        ledger.record(&mut state, &finished(Phase::Ended, day(1, 9), 0, 0, 0));
        ledger.record(&mut state, &finished(Phase::Ended, day(1, 11), 0, 1, 0));
        assert_eq!(state.session.current, 2);
        assert_eq!(state.perfect.current, 0);
        assert_eq!(state.perfect.best, 1);

        ledger.record(&mut state, &finished(Phase::Ended, day(1, 13), 1, 0, 0));
        assert_eq!(state.session.current, 0);
        assert_eq!(state.session.best, 2);
    }

    #[test]
    fn emergency_exit_resets_both_session_streaks() {
        let ledger = StreakLedger::utc();
        let mut state = StreakState::default();
        ledger.record(&mut state, &finished(Phase::Ended, day(1, 9), 0, 0, 0));
        ledger.record(&mut state, &finished(Phase::EmergencyExited, day(1, 11), 1, 0, 1));
        assert_eq!(state.session.current, 0);
        assert_eq!(state.perfect.current, 0);
        // Emergency-exited sessions still count as activity for the day.
        assert_eq!(state.daily.current, 1);
    }

    #[test]
    fn two_sessions_same_day_count_once() {
        let ledger = StreakLedger::utc();
        let mut state = StreakState::default();
        ledger.record(&mut state, &finished(Phase::Ended, day(3, 9), 0, 0, 0));
        ledger.record(&mut state, &finished(Phase::Ended, day(3, 20), 0, 0, 0));
        assert_eq!(state.daily.current, 1);
    }

    #[test]
    fn consecutive_days_increment_and_gaps_restart() {
        let ledger = StreakLedger::utc();
        let mut state = StreakState::default();
        ledger.record(&mut state, &finished(Phase::Ended, day(3, 9), 0, 0, 0));
        ledger.record(&mut state, &finished(Phase::Ended, day(4, 9), 0, 0, 0));
        ledger.record(&mut state, &finished(Phase::Ended, day(5, 9), 0, 0, 0));
        assert_eq!(state.daily.current, 3);
        ledger.record(&mut state, &finished(Phase::Ended, day(8, 9), 0, 0, 0));
        assert_eq!(state.daily.current, 1);
        assert_eq!(state.daily.best, 3);
    }

    #[test]
    fn earlier_day_does_not_move_daily_counter() {
        let ledger = StreakLedger::utc();
        let mut state = StreakState::default();
        ledger.record(&mut state, &finished(Phase::Ended, day(5, 9), 0, 0, 0));
        ledger.record(&mut state, &finished(Phase::Ended, day(2, 9), 0, 0, 0));
        assert_eq!(state.daily.current, 1);
        assert_eq!(state.last_activity_date, Some(day(5, 9).date_naive()));
    }

    #[test]
    fn abandoned_sessions_reset_but_never_count_for_daily() {
        let ledger = StreakLedger::utc();
        let mut state = StreakState::default();
        ledger.record(&mut state, &finished(Phase::Ended, day(1, 9), 0, 0, 0));
        ledger.record(&mut state, &finished(Phase::Abandoned, day(2, 9), 0, 0, 0));
        assert_eq!(state.session.current, 0);
        assert_eq!(state.perfect.current, 0);
        assert_eq!(state.daily.current, 1);
        assert_eq!(state.last_activity_date, Some(day(1, 9).date_naive()));
    }

    #[test]
    fn calendar_day_follows_offset() {
        let tokyo = StreakLedger::new(FixedOffset::east_opt(9 * 3600).unwrap());
        let mut state = StreakState::default();
        // 20:00 UTC on the 1st is 05:00 on the 2nd in UTC+9.
        tokyo.record(&mut state, &finished(Phase::Ended, day(1, 20), 0, 0, 0));
        assert_eq!(
            state.last_activity_date,
            Some(NaiveDate::from_ymd_opt(2026, 5, 2).unwrap())
        );
    }

    #[test]
    fn milestones_are_reported_when_reached() {
        let ledger = StreakLedger::utc();
        let mut state = StreakState::default();
        state.session = StreakCounter { current: 4, best: 4 };
        let outcome = ledger.record(&mut state, &finished(Phase::Ended, day(1, 9), 0, 0, 0));
        let RecordOutcome::Applied { milestones } = outcome else {
            panic!("expected applied");
        };
        assert!(milestones.contains(&Milestone { kind: StreakKind::Session, count: 5 }));
        assert_eq!(
            ledger.milestone(&state, StreakKind::Session),
            Some(Milestone { kind: StreakKind::Session, count: 5 })
        );
        assert_eq!(ledger.milestone(&state, StreakKind::Daily), None);
    }

    #[test]
    fn daily_risk_levels() {
        let ledger = StreakLedger::utc();
        let mut state = StreakState::default();
        assert!(ledger.daily_risk(&state, day(1, 9)).is_none());
        ledger.record(&mut state, &finished(Phase::Ended, day(1, 9), 0, 0, 0));

        let low = ledger.daily_risk(&state, day(1, 15)).unwrap();
        assert_eq!(low.level, RiskLevel::Low);
        let medium = ledger.daily_risk(&state, day(2, 0)).unwrap();
        assert_eq!(medium.level, RiskLevel::Medium);
        let high = ledger.daily_risk(&state, day(2, 5)).unwrap();
        assert_eq!(high.level, RiskLevel::High);
        assert!((high.hours_left - 4.0).abs() < 1e-9);
    }

    #[test]
    fn status_display() {
        let ledger = StreakLedger::utc();
        let mut state = StreakState::default();
        assert_eq!(ledger.status(&state, StreakKind::Daily).display, "No active streak (best 0)");
        state.daily = StreakCounter { current: 3, best: 7 };
        let status = ledger.status(&state, StreakKind::Daily);
        assert!(status.active);
        assert_eq!(status.display, "3 days (best 7)");
    }

    #[test]
    fn shared_streaks_serialize_concurrent_records() {
        let shared = std::sync::Arc::new(SharedStreaks::default());
        let sessions: Vec<Session> = (0..8)
            .map(|_| finished(Phase::Ended, day(1, 9), 0, 0, 0))
            .collect();
        std::thread::scope(|scope| {
            for session in &sessions {
                let shared = shared.clone();
                scope.spawn(move || {
                    shared.record(session);
                    shared.record(session);
                });
            }
        });
        let state = shared.snapshot();
        assert_eq!(state.session.current, 8);
        assert_eq!(state.applied.len(), 8);
        assert_eq!(state.daily.current, 1);
    }

    #[test]
    fn applied_ids_are_pruned_behind_the_newest_day() {
        let ledger = StreakLedger::utc();
        let mut state = StreakState::default();
        let old = finished(Phase::Ended, day(1, 9), 0, 0, 0);
        ledger.record(&mut state, &old);
        for d in 2..=12 {
            ledger.record(&mut state, &finished(Phase::Ended, day(d, 9), 0, 0, 0));
        }
        assert_eq!(state.applied.len(), 8);
        assert!(!state.applied.contains_key(&old.id));
        assert_eq!(state.pruned_before, Some(day(5, 0).date_naive()));

        // A pruned session cannot be applied a second time.
        let snapshot = state.clone();
        assert_eq!(ledger.record(&mut state, &old), RecordOutcome::Expired);
        assert_eq!(state, snapshot);
        assert_eq!(state.session.current, 12);
    }

    #[test]
    fn late_session_inside_the_window_still_counts() {
        let ledger = StreakLedger::utc();
        let mut state = StreakState::default();
        ledger.record(&mut state, &finished(Phase::Ended, day(10, 9), 0, 0, 0));
        let late = finished(Phase::Ended, day(4, 9), 0, 0, 0);
        assert!(matches!(ledger.record(&mut state, &late), RecordOutcome::Applied { .. }));
        assert_eq!(state.session.current, 2);
    }

    #[test]
    fn streak_kind_parses_names() {
        assert_eq!("Daily".parse::<StreakKind>(), Ok(StreakKind::Daily));
        assert_eq!(" perfect ".parse::<StreakKind>(), Ok(StreakKind::Perfect));
        assert!("weekly".parse::<StreakKind>().is_err());
    }
}
