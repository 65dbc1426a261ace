//! Session state machine.
//!
//! ## State Transitions
//!
//! ```text
//! Working -> BreakActive -> Working -> ... -> (Cooldown | EndBreak) -> Ended
//!                  \-> EmergencyExited            \-> EmergencyExited
//! any non-terminal -> Abandoned
//! ```
//!
//! The manager is synchronous and owns no timers. Every input returns the
//! list of [`Directive`]s the caller must carry out, in order. Inputs that
//! are not allowed return an error and leave the session untouched.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::model::{BreakOutcome, RealizedBreak, Session, Task};
use crate::error::{CoreError, Result};
use crate::escape::EscapeGate;
use crate::events::Event;
use crate::policy::{Action, Mode, ModeParameters, ModePolicy, Phase};
use crate::scheduler::{self, ClosingRest, IntervalKind};
use crate::timer::{CountdownSignal, TimerSignal};

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Notify(Event),
    /// Replace any running countdown with a new one.
    StartTimer {
        generation: u64,
        duration: Duration,
        /// Arm the ending-soon warning.
        warn: bool,
    },
    /// Push the running countdown's end back.
    ExtendTimer { generation: u64, by: Duration },
    CancelTimer,
    PhaseEffects { mode: Mode, phase: Phase },
    /// Terminal snapshot for persistence and the streak ledger. Emitted once.
    Finalize(Box<Session>),
}

/// User-initiated input. Emergency exits arrive through
/// [`SessionManager::emergency_exit`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    TakeBreak,
    Snooze,
    Skip,
    Extend(Duration),
}

impl UserAction {
    pub fn action(self) -> Action {
        match self {
            UserAction::TakeBreak => Action::TakeBreak,
            UserAction::Snooze => Action::Snooze,
            UserAction::Skip => Action::Skip,
            UserAction::Extend(_) => Action::Extend,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionManager {
    policy: ModePolicy,
    session: Session,
    /// Index of the plan interval currently running. Equal to the plan
    /// length during the closing rest.
    cursor: usize,
    /// Tag of the countdown currently owned.
    generation: u64,
    /// Bumped on every phase change; escape requests must match it.
    epoch: u64,
}

impl SessionManager {
    /// Plan `task` and enter `working`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPlan` or `InvalidDuration` if the task cannot be
    /// scheduled. Nothing is started in that case.
    pub fn start(task: Task, policy: &ModePolicy, now: DateTime<Utc>) -> Result<(Self, Vec<Directive>)> {
        if task.duration.is_zero() {
            return Err(CoreError::non_positive("task duration", task.duration));
        }
        let params = policy.parameters(task.mode);
        let plan = scheduler::plan(task.duration, params, &task.strategy)?;
        plan.validate_offsets()?;

        let session = Session {
            id: uuid::Uuid::new_v4(),
            mode: task.mode,
            started_at: now,
            phase: Phase::Working,
            breaks: Vec::new(),
            breaks_taken: 0,
            breaks_snoozed: 0,
            breaks_skipped: 0,
            emergency_exits: 0,
            extended_count: 0,
            snooze_passes_remaining: params.snooze.map(|s| s.max_passes).unwrap_or(0),
            ended_at: None,
            quality_score: None,
            plan,
            task,
        };

        let mut manager = Self {
            policy: policy.clone(),
            session,
            cursor: 0,
            generation: 0,
            epoch: 0,
        };

        tracing::info!(
            session = %manager.session.id,
            mode = %manager.session.mode,
            intervals = manager.session.plan.intervals.len(),
            "session started"
        );

        let first = manager
            .session
            .plan
            .intervals
            .first()
            .map(|i| i.duration)
            .ok_or_else(|| CoreError::InvalidPlan("plan has no intervals".into()))?;
        let directives = vec![
            Directive::Notify(Event::SessionStarted {
                session_id: manager.session.id,
                task: manager.session.task.name.clone(),
                mode: manager.session.mode,
                total_secs: manager.session.task.duration.as_secs(),
                breaks_planned: manager.session.plan.breaks().count(),
                at: now,
            }),
            Directive::PhaseEffects {
                mode: manager.session.mode,
                phase: Phase::Working,
            },
            manager.start_timer(first, false),
        ];
        Ok((manager, directives))
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    pub fn mode(&self) -> Mode {
        self.session.mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_terminal(&self) -> bool {
        self.session.is_terminal()
    }

    fn params(&self) -> &ModeParameters {
        self.policy.parameters(self.session.mode)
    }

    /// Availability gate for the escape monitor.
    pub fn gate(&self) -> EscapeGate {
        EscapeGate {
            mode: self.session.mode,
            phase: self.session.phase,
            epoch: self.epoch,
            available: self
                .policy
                .is_escape_available(self.session.mode, self.session.phase),
        }
    }

    /// Diagnostic event for a rejected input.
    pub fn diagnostic(&self, error: &CoreError, now: DateTime<Utc>) -> Directive {
        Directive::Notify(Event::Diagnostic {
            session_id: self.session.id,
            message: error.to_string(),
            at: now,
        })
    }

    // ── Inputs ───────────────────────────────────────────────────────

    /// Apply a countdown signal.
    ///
    /// # Errors
    ///
    /// Returns `StaleEvent` if the signal comes from a timer this manager
    /// no longer owns.
    pub fn on_timer(&mut self, signal: TimerSignal, now: DateTime<Utc>) -> Result<Vec<Directive>> {
        if signal.generation != self.generation || self.is_terminal() {
            return Err(CoreError::StaleEvent {
                source_name: "timer",
                expected: self.generation,
                received: signal.generation,
            });
        }

        match signal.signal {
            CountdownSignal::Tick { remaining } => Ok(vec![Directive::Notify(Event::TimerTick {
                session_id: self.session.id,
                phase: self.session.phase,
                remaining_secs: remaining.as_secs(),
                at: now,
            })]),
            CountdownSignal::EndingSoon { remaining } => {
                Ok(vec![Directive::Notify(Event::BreakEndingSoon {
                    session_id: self.session.id,
                    phase: self.session.phase,
                    remaining_secs: remaining.as_secs(),
                    at: now,
                })])
            }
            CountdownSignal::Completed => Ok(self.on_completed(now)),
        }
    }

    /// Apply a user action.
    ///
    /// # Errors
    ///
    /// Returns `ActionNotPermitted` if the mode policy does not allow the
    /// action in the current phase, or the current break is already
    /// resolved, no snooze passes remain, or an extension is requested before
    /// the final work interval. Returns `InvalidDuration` for a zero or
    /// oversized extension.
    pub fn act(&mut self, action: UserAction, now: DateTime<Utc>) -> Result<Vec<Directive>> {
        self.ensure_allowed(action.action())?;
        match action {
            UserAction::TakeBreak => self.end_break_early(BreakOutcome::Taken, now),
            UserAction::Skip => self.end_break_early(BreakOutcome::Skipped, now),
            UserAction::Snooze => self.snooze(now),
            UserAction::Extend(by) => self.extend(by, now),
        }
    }

    /// Apply a confirmed escape hold armed under `epoch`.
    ///
    /// # Errors
    ///
    /// Returns `StaleEvent` if the phase changed since the hold was armed,
    /// or `ActionNotPermitted` if the current phase has no emergency exit.
    pub fn emergency_exit(&mut self, epoch: u64, now: DateTime<Utc>) -> Result<Vec<Directive>> {
        if epoch != self.epoch {
            return Err(CoreError::StaleEvent {
                source_name: "escape",
                expected: self.epoch,
                received: epoch,
            });
        }
        self.ensure_allowed(Action::EmergencyExit)?;

        let phase = self.session.phase;
        let mut directives = vec![Directive::CancelTimer];
        if phase == Phase::BreakActive {
            if let Some(event) = self.resolve_pending(BreakOutcome::Skipped, now) {
                directives.push(Directive::Notify(event));
            }
        }
        self.session.emergency_exits += 1;
        tracing::warn!(session = %self.session.id, %phase, "emergency exit");
        directives.push(Directive::Notify(Event::EmergencyExitOccurred {
            session_id: self.session.id,
            phase,
            consequence: ModePolicy::emergency_exit_consequence(self.session.mode).to_string(),
            at: now,
        }));
        directives.extend(self.terminate(Phase::EmergencyExited, now));
        Ok(directives)
    }

    /// External cancel from any non-terminal phase.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the session already ended.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<Vec<Directive>> {
        if self.is_terminal() {
            return Err(CoreError::SessionClosed(self.session.id));
        }
        let mut directives = vec![Directive::CancelTimer];
        if let Some(event) = self.resolve_pending(BreakOutcome::Skipped, now) {
            directives.push(Directive::Notify(event));
        }
        directives.extend(self.terminate(Phase::Abandoned, now));
        Ok(directives)
    }

    // ── Transitions ──────────────────────────────────────────────────

    fn ensure_allowed(&self, action: Action) -> Result<()> {
        let (mode, phase) = (self.session.mode, self.session.phase);
        if self.policy.allowed_actions(mode, phase).contains(action) {
            Ok(())
        } else {
            Err(CoreError::not_permitted(action, mode, phase))
        }
    }

    fn start_timer(&mut self, duration: Duration, warn: bool) -> Directive {
        self.generation += 1;
        Directive::StartTimer {
            generation: self.generation,
            duration,
            warn,
        }
    }

    fn enter_phase(&mut self, phase: Phase) -> Directive {
        tracing::info!(session = %self.session.id, from = %self.session.phase, to = %phase, "phase change");
        self.session.phase = phase;
        self.epoch += 1;
        Directive::PhaseEffects {
            mode: self.session.mode,
            phase,
        }
    }

    fn on_completed(&mut self, now: DateTime<Utc>) -> Vec<Directive> {
        match self.session.phase {
            Phase::Working => {
                self.cursor += 1;
                self.enter_next_interval(now)
            }
            Phase::BreakActive => {
                let mut directives = Vec::new();
                // A snoozed break is already counted; its timeout adds nothing.
                if let Some(event) = self.resolve_pending(BreakOutcome::Taken, now) {
                    directives.push(Directive::Notify(event));
                } else if let Some(event) = self.closing_event_for_snoozed(now) {
                    directives.push(Directive::Notify(event));
                }
                self.cursor += 1;
                directives.extend(self.enter_next_interval(now));
                directives
            }
            Phase::Cooldown | Phase::EndBreak => self.terminate(Phase::Ended, now),
            Phase::Ended | Phase::EmergencyExited | Phase::Abandoned => Vec::new(),
        }
    }

    fn enter_next_interval(&mut self, now: DateTime<Utc>) -> Vec<Directive> {
        let Some(interval) = self.session.plan.intervals.get(self.cursor).copied() else {
            return self.finish_work(now);
        };

        match interval.kind {
            IntervalKind::Work if self.session.phase == Phase::Working => {
                // Consecutive work after an extension: restart silently.
                vec![self.start_timer(interval.duration, false)]
            }
            IntervalKind::Work => vec![
                self.enter_phase(Phase::Working),
                self.start_timer(interval.duration, false),
            ],
            IntervalKind::Break => {
                let index = self.session.breaks.len();
                self.session.breaks.push(RealizedBreak {
                    interval: self.cursor,
                    planned_offset: interval.offset,
                    planned_duration: interval.duration,
                    started_at: now,
                    ended_at: None,
                    outcome: None,
                });
                vec![
                    Directive::Notify(Event::BreakStarted {
                        session_id: self.session.id,
                        index,
                        offset_secs: interval.offset.as_secs(),
                        duration_secs: interval.duration.as_secs(),
                        at: now,
                    }),
                    self.enter_phase(Phase::BreakActive),
                    self.start_timer(interval.duration, true),
                ]
            }
        }
    }

    fn finish_work(&mut self, now: DateTime<Utc>) -> Vec<Directive> {
        match self.session.plan.closing_rest {
            Some(ClosingRest::Cooldown(duration)) => vec![
                Directive::Notify(Event::CooldownStarted {
                    session_id: self.session.id,
                    duration_secs: duration.as_secs(),
                    at: now,
                }),
                self.enter_phase(Phase::Cooldown),
                self.start_timer(duration, true),
            ],
            Some(ClosingRest::EndBreak(duration)) => vec![
                Directive::Notify(Event::EndBreakStarted {
                    session_id: self.session.id,
                    duration_secs: duration.as_secs(),
                    at: now,
                }),
                self.enter_phase(Phase::EndBreak),
                self.start_timer(duration, true),
            ],
            None => self.terminate(Phase::Ended, now),
        }
    }

    /// Resolve the on-screen break. `None` if nothing was pending.
    fn resolve_pending(&mut self, outcome: BreakOutcome, now: DateTime<Utc>) -> Option<Event> {
        let index = self.session.breaks.len().checked_sub(1)?;
        let pending = self.session.breaks.last_mut().filter(|b| b.outcome.is_none())?;
        pending.outcome = Some(outcome);
        pending.ended_at = Some(now);
        match outcome {
            BreakOutcome::Taken => self.session.breaks_taken += 1,
            BreakOutcome::Snoozed => self.session.breaks_snoozed += 1,
            BreakOutcome::Skipped => self.session.breaks_skipped += 1,
        }
        tracing::info!(session = %self.session.id, index, outcome = outcome.as_str(), "break resolved");
        Some(Event::BreakEnded {
            session_id: self.session.id,
            index,
            outcome,
            at: now,
        })
    }

    /// `BreakEnded` for a snoozed break whose extended timer ran out.
    fn closing_event_for_snoozed(&mut self, now: DateTime<Utc>) -> Option<Event> {
        let index = self.session.breaks.len().checked_sub(1)?;
        let current = self.session.breaks.last_mut()?;
        current.ended_at = Some(now);
        Some(Event::BreakEnded {
            session_id: self.session.id,
            index,
            outcome: current.outcome?,
            at: now,
        })
    }

    fn end_break_early(&mut self, outcome: BreakOutcome, now: DateTime<Utc>) -> Result<Vec<Directive>> {
        let action = match outcome {
            BreakOutcome::Taken => Action::TakeBreak,
            _ => Action::Skip,
        };
        if self.session.pending_break().is_none() {
            return Err(CoreError::not_permitted_because(
                action,
                self.session.mode,
                self.session.phase,
                "break already resolved",
            ));
        }
        let mut directives = vec![Directive::CancelTimer];
        if let Some(event) = self.resolve_pending(outcome, now) {
            directives.push(Directive::Notify(event));
        }
        self.cursor += 1;
        directives.extend(self.enter_next_interval(now));
        Ok(directives)
    }

    fn snooze(&mut self, now: DateTime<Utc>) -> Result<Vec<Directive>> {
        let (mode, phase) = (self.session.mode, self.session.phase);
        let rules = self
            .params()
            .snooze
            .ok_or_else(|| CoreError::not_permitted(Action::Snooze, mode, phase))?;
        if self.session.pending_break().is_none() {
            return Err(CoreError::not_permitted_because(
                Action::Snooze,
                mode,
                phase,
                "break already resolved",
            ));
        }
        if self.session.snooze_passes_remaining == 0 {
            return Err(CoreError::not_permitted_because(
                Action::Snooze,
                mode,
                phase,
                "no snooze passes left",
            ));
        }

        self.session.snooze_passes_remaining -= 1;
        let index = self.session.breaks.len() - 1;
        let pending = &mut self.session.breaks[index];
        pending.outcome = Some(BreakOutcome::Snoozed);
        self.session.breaks_snoozed += 1;
        tracing::info!(
            session = %self.session.id,
            index,
            passes_remaining = self.session.snooze_passes_remaining,
            "break snoozed"
        );

        Ok(vec![
            Directive::Notify(Event::BreakSnoozed {
                session_id: self.session.id,
                index,
                snooze_secs: rules.duration.as_secs(),
                passes_remaining: self.session.snooze_passes_remaining,
                at: now,
            }),
            Directive::ExtendTimer {
                generation: self.generation,
                by: rules.duration,
            },
        ])
    }

    /// Extension is offered at the natural end of the session, i.e. while the
    /// last planned work interval runs. After an extension the new tail has
    /// to be reached before another one is accepted.
    fn extend(&mut self, by: Duration, now: DateTime<Utc>) -> Result<Vec<Directive>> {
        if self.cursor + 1 < self.session.plan.intervals.len() {
            return Err(CoreError::not_permitted_because(
                Action::Extend,
                self.session.mode,
                self.session.phase,
                "only offered in the final work interval",
            ));
        }
        let params = self.policy.parameters(self.session.mode).clone();
        self.session.plan.extend(by, &params)?;
        self.session.extended_count += 1;
        if let Some(rules) = params.snooze {
            self.session.snooze_passes_remaining = rules.max_passes;
        }
        tracing::info!(
            session = %self.session.id,
            extension_secs = by.as_secs(),
            extended_count = self.session.extended_count,
            "session extended"
        );
        Ok(vec![Directive::Notify(Event::SessionExtended {
            session_id: self.session.id,
            extension_secs: by.as_secs(),
            extended_count: self.session.extended_count,
            at: now,
        })])
    }

    fn terminate(&mut self, phase: Phase, now: DateTime<Utc>) -> Vec<Directive> {
        // Any signal from the last countdown is stale from here on.
        self.generation += 1;
        let effects = self.enter_phase(phase);
        self.session.ended_at = Some(now);
        let quality = self.session.current_quality();
        self.session.quality_score = Some(quality);

        let event = if phase == Phase::Abandoned {
            Event::SessionAbandoned {
                session_id: self.session.id,
                at: now,
            }
        } else {
            Event::SessionEnded {
                session_id: self.session.id,
                phase,
                quality,
                at: now,
            }
        };
        tracing::info!(session = %self.session.id, %phase, quality, "session finished");
        vec![
            effects,
            Directive::Notify(event),
            Directive::Finalize(Box::new(self.session.clone())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Strategy;
    use chrono::TimeZone;

    fn min(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 6, 9, 0, 0).unwrap()
    }

    fn start(mode: Mode, total: Duration) -> SessionManager {
        let task = Task::new("write", total, mode, Strategy::Auto).unwrap();
        SessionManager::start(task, &ModePolicy::default(), t0()).unwrap().0
    }

    fn complete(m: &mut SessionManager) -> Vec<Directive> {
        let signal = TimerSignal {
            generation: m.generation(),
            signal: CountdownSignal::Completed,
        };
        m.on_timer(signal, t0()).unwrap()
    }

    fn finalized(directives: &[Directive]) -> Option<&Session> {
        directives.iter().find_map(|d| match d {
            Directive::Finalize(s) => Some(s.as_ref()),
            _ => None,
        })
    }

    #[test]
    fn start_emits_session_started_and_first_timer() {
        let task = Task::new("write", min(55), Mode::Flexible, Strategy::Auto).unwrap();
        let (m, directives) = SessionManager::start(task, &ModePolicy::default(), t0()).unwrap();
        assert!(matches!(directives[0], Directive::Notify(Event::SessionStarted { breaks_planned: 1, .. })));
        assert_eq!(
            directives[2],
            Directive::StartTimer { generation: 1, duration: min(25), warn: false }
        );
        assert_eq!(m.phase(), Phase::Working);
    }

    #[test]
    fn invalid_plan_starts_nothing() {
        let task = Task::new(
            "x",
            min(30),
            Mode::Flexible,
            Strategy::Manual { count: 3, duration: min(15) },
        )
        .unwrap();
        let err = SessionManager::start(task, &ModePolicy::default(), t0()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPlan(_)));
    }

    #[test]
    fn flexible_session_walks_through_break_to_end() {
        let mut m = start(Mode::Flexible, min(55));
        complete(&mut m);
        assert_eq!(m.phase(), Phase::BreakActive);
        assert!(m.session().accounting_holds());

        let directives = complete(&mut m);
        assert_eq!(m.phase(), Phase::Working);
        assert!(directives.contains(&Directive::Notify(Event::BreakEnded {
            session_id: m.session().id,
            index: 0,
            outcome: BreakOutcome::Taken,
            at: t0(),
        })));

        let directives = complete(&mut m);
        assert_eq!(m.phase(), Phase::Ended);
        let session = finalized(&directives).unwrap();
        assert_eq!(session.breaks_taken, 1);
        assert_eq!(session.quality_score, Some(1.0));
    }

    #[test]
    fn skip_and_take_end_break_early() {
        let mut m = start(Mode::Flexible, min(90));
        complete(&mut m);
        m.act(UserAction::Skip, t0()).unwrap();
        assert_eq!(m.phase(), Phase::Working);
        complete(&mut m);
        m.act(UserAction::TakeBreak, t0()).unwrap();
        assert_eq!(m.session().breaks_skipped, 1);
        assert_eq!(m.session().breaks_taken, 1);
        assert!(m.session().accounting_holds());
    }

    #[test]
    fn snooze_counts_once_and_locks_the_break() {
        let mut m = start(Mode::Flexible, min(55));
        complete(&mut m);
        let generation = m.generation();
        let directives = m.act(UserAction::Snooze, t0()).unwrap();
        assert!(directives.contains(&Directive::ExtendTimer { generation, by: min(5) }));
        assert_eq!(m.phase(), Phase::BreakActive);
        assert_eq!(m.session().breaks_snoozed, 1);
        assert_eq!(m.session().snooze_passes_remaining, 2);

        assert!(m.act(UserAction::Skip, t0()).is_err());
        assert!(m.act(UserAction::Snooze, t0()).is_err());

        complete(&mut m);
        assert_eq!(m.phase(), Phase::Working);
        assert_eq!(m.session().resolved_breaks(), 1);
        assert!(m.session().accounting_holds());
    }

    #[test]
    fn snooze_budget_runs_out_and_extend_restores_it() {
        let mut config = crate::storage::Config::default();
        config.flexible.max_snooze_passes = 1;
        let policy = ModePolicy::from_config(&config).unwrap();
        let task = Task::new("x", min(90), Mode::Flexible, Strategy::Auto).unwrap();
        let (mut m, _) = SessionManager::start(task, &policy, t0()).unwrap();

        complete(&mut m);
        m.act(UserAction::Snooze, t0()).unwrap();
        complete(&mut m);
        complete(&mut m);
        let err = m.act(UserAction::Snooze, t0()).unwrap_err();
        assert!(err.to_string().contains("no snooze passes left"));
        m.act(UserAction::TakeBreak, t0()).unwrap();

        m.act(UserAction::Extend(min(30)), t0()).unwrap();
        assert_eq!(m.session().snooze_passes_remaining, 1);
        assert_eq!(m.session().extended_count, 1);
    }

    #[test]
    fn extend_waits_for_the_final_work_interval() {
        let mut m = start(Mode::Flexible, min(55));
        let before = m.session().clone();
        let err = m.act(UserAction::Extend(min(10)), t0()).unwrap_err();
        assert!(err.to_string().contains("final work interval"));
        assert_eq!(m.session(), &before);

        complete(&mut m);
        complete(&mut m);
        assert_eq!(m.phase(), Phase::Working);
        m.act(UserAction::Extend(min(10)), t0()).unwrap();
        // The new tail has not been reached yet.
        assert!(m.act(UserAction::Extend(min(10)), t0()).is_err());
        assert_eq!(m.session().extended_count, 1);
    }

    #[test]
    fn oversized_extension_is_rejected_without_changes() {
        let mut m = start(Mode::Focused, min(480));
        let before = m.session().clone();
        let err = m.act(UserAction::Extend(Duration::MAX), t0()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidDuration(_)));
        assert_eq!(m.session(), &before);

        m.act(UserAction::Extend(min(480)), t0()).unwrap();
        assert_eq!(m.session().plan.work_total(), min(960));
    }

    #[test]
    fn strict_rejects_snooze_and_skip_without_changes() {
        let mut m = start(Mode::Strict, min(120));
        complete(&mut m);
        let before = m.session().clone();
        for action in [UserAction::Snooze, UserAction::Skip, UserAction::TakeBreak] {
            let err = m.act(action, t0()).unwrap_err();
            assert!(matches!(err, CoreError::ActionNotPermitted { .. }));
        }
        assert_eq!(m.session(), &before);
    }

    #[test]
    fn strict_emergency_exit_during_break() {
        let mut m = start(Mode::Strict, min(120));
        complete(&mut m);
        let directives = m.emergency_exit(m.epoch(), t0()).unwrap();
        assert_eq!(m.phase(), Phase::EmergencyExited);
        let session = finalized(&directives).unwrap();
        assert_eq!(session.breaks_skipped, 1);
        assert_eq!(session.emergency_exits, 1);
        assert_eq!(session.quality_score, Some(0.0));
        assert!(session.accounting_holds());
    }

    #[test]
    fn stale_escape_request_is_discarded() {
        let mut m = start(Mode::Strict, min(120));
        complete(&mut m);
        let armed = m.epoch();
        complete(&mut m);
        assert_eq!(m.phase(), Phase::Working);
        let err = m.emergency_exit(armed, t0()).unwrap_err();
        assert!(matches!(err, CoreError::StaleEvent { source_name: "escape", .. }));
        assert_eq!(m.session().emergency_exits, 0);
    }

    #[test]
    fn emergency_exit_unavailable_while_working() {
        let mut m = start(Mode::Strict, min(120));
        let err = m.emergency_exit(m.epoch(), t0()).unwrap_err();
        assert!(matches!(err, CoreError::ActionNotPermitted { .. }));
        assert!(!m.gate().available);
    }

    #[test]
    fn strict_session_ends_after_cooldown() {
        let mut m = start(Mode::Strict, min(60));
        // 52m work then 8m remaining: no break fits, straight to cooldown.
        let directives = complete(&mut m);
        assert_eq!(m.phase(), Phase::Cooldown);
        assert!(directives.contains(&Directive::StartTimer {
            generation: m.generation(),
            duration: min(20),
            warn: true,
        }));
        assert!(m.gate().available);
        complete(&mut m);
        assert_eq!(m.phase(), Phase::Ended);
    }

    #[test]
    fn focused_session_runs_to_end_break() {
        let mut m = start(Mode::Focused, min(150));
        complete(&mut m);
        assert_eq!(m.phase(), Phase::EndBreak);
        let directives = complete(&mut m);
        let session = finalized(&directives).unwrap();
        assert_eq!(session.phase, Phase::Ended);
        assert_eq!(session.quality_score, Some(1.0));
    }

    #[test]
    fn focused_extension_flows_through_silently() {
        let mut m = start(Mode::Focused, min(100));
        m.act(UserAction::Extend(min(30)), t0()).unwrap();
        let directives = complete(&mut m);
        assert_eq!(m.phase(), Phase::Working);
        assert_eq!(
            directives,
            vec![Directive::StartTimer { generation: m.generation(), duration: min(30), warn: false }]
        );
        let directives = complete(&mut m);
        assert!(directives.iter().any(|d| matches!(
            d,
            Directive::Notify(Event::EndBreakStarted { duration_secs: 2700, .. })
        )));
    }

    #[test]
    fn stale_timer_signal_is_rejected() {
        let mut m = start(Mode::Flexible, min(55));
        let old = m.generation();
        complete(&mut m);
        let err = m
            .on_timer(TimerSignal { generation: old, signal: CountdownSignal::Completed }, t0())
            .unwrap_err();
        assert!(matches!(err, CoreError::StaleEvent { source_name: "timer", .. }));
        assert_eq!(m.phase(), Phase::BreakActive);
    }

    #[test]
    fn cancel_during_break_resolves_it_as_skipped() {
        let mut m = start(Mode::Flexible, min(55));
        complete(&mut m);
        let directives = m.cancel(t0()).unwrap();
        let session = finalized(&directives).unwrap();
        assert_eq!(session.phase, Phase::Abandoned);
        assert_eq!(session.breaks_skipped, 1);
        assert!(session.accounting_holds());
        assert!(matches!(m.cancel(t0()), Err(CoreError::SessionClosed(_))));
    }

    #[test]
    fn terminal_session_accepts_nothing() {
        let mut m = start(Mode::Flexible, min(20));
        complete(&mut m);
        assert!(m.is_terminal());
        assert!(m.act(UserAction::Extend(min(5)), t0()).is_err());
        let signal = TimerSignal { generation: m.generation(), signal: CountdownSignal::Completed };
        assert!(m.on_timer(signal, t0()).is_err());
    }

    #[test]
    fn ticks_and_warnings_become_notifications() {
        let mut m = start(Mode::Flexible, min(55));
        complete(&mut m);
        let directives = m
            .on_timer(
                TimerSignal {
                    generation: m.generation(),
                    signal: CountdownSignal::EndingSoon { remaining: Duration::from_secs(60) },
                },
                t0(),
            )
            .unwrap();
        assert!(matches!(
            directives[0],
            Directive::Notify(Event::BreakEndingSoon { remaining_secs: 60, phase: Phase::BreakActive, .. })
        ));
    }
}
