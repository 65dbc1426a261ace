use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policy::{Mode, Phase};
use crate::session::BreakOutcome;
use crate::streak::StreakKind;

/// Every session transition produces an Event.
/// The notifier receives them in order; the CLI prints them as JSON lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        session_id: Uuid,
        task: String,
        mode: Mode,
        total_secs: u64,
        breaks_planned: usize,
        at: DateTime<Utc>,
    },
    BreakStarted {
        session_id: Uuid,
        /// Position of the break among the plan's breaks.
        index: usize,
        offset_secs: u64,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    /// Break timer pushed back; the break stays on screen.
    BreakSnoozed {
        session_id: Uuid,
        index: usize,
        snooze_secs: u64,
        passes_remaining: u32,
        at: DateTime<Utc>,
    },
    BreakEndingSoon {
        session_id: Uuid,
        phase: Phase,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    BreakEnded {
        session_id: Uuid,
        index: usize,
        outcome: BreakOutcome,
        at: DateTime<Utc>,
    },
    CooldownStarted {
        session_id: Uuid,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    EndBreakStarted {
        session_id: Uuid,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    SessionExtended {
        session_id: Uuid,
        extension_secs: u64,
        extended_count: u32,
        at: DateTime<Utc>,
    },
    EmergencyExitOccurred {
        session_id: Uuid,
        phase: Phase,
        consequence: String,
        at: DateTime<Utc>,
    },
    SessionEnded {
        session_id: Uuid,
        phase: Phase,
        quality: f64,
        at: DateTime<Utc>,
    },
    SessionAbandoned {
        session_id: Uuid,
        at: DateTime<Utc>,
    },
    TimerTick {
        session_id: Uuid,
        phase: Phase,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    StreakMilestone {
        kind: StreakKind,
        count: u32,
        at: DateTime<Utc>,
    },
    /// Rejected action or dropped stale event. State is unchanged.
    Diagnostic {
        session_id: Uuid,
        message: String,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::SessionStarted { at, .. }
            | Event::BreakStarted { at, .. }
            | Event::BreakSnoozed { at, .. }
            | Event::BreakEndingSoon { at, .. }
            | Event::BreakEnded { at, .. }
            | Event::CooldownStarted { at, .. }
            | Event::EndBreakStarted { at, .. }
            | Event::SessionExtended { at, .. }
            | Event::EmergencyExitOccurred { at, .. }
            | Event::SessionEnded { at, .. }
            | Event::SessionAbandoned { at, .. }
            | Event::TimerTick { at, .. }
            | Event::StreakMilestone { at, .. }
            | Event::Diagnostic { at, .. } => *at,
        }
    }

    /// High-frequency events a quiet consumer may drop.
    pub fn is_tick(&self) -> bool {
        matches!(self, Event::TimerTick { .. })
    }
}
