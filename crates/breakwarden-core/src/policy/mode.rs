//! Mode, phase and action vocabulary shared by every component.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Enforcement policy chosen for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Breaks can be taken early, snoozed or skipped; sessions can be extended.
    Flexible,
    /// Breaks are enforced and followed by a mandatory cooldown.
    Strict,
    /// No interruptions during work; one mandatory end-break.
    Focused,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Flexible, Mode::Strict, Mode::Focused];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Flexible => "flexible",
            Mode::Strict => "strict",
            Mode::Focused => "focused",
        }
    }

    /// Whether breaks are scheduled inside the work time.
    pub fn has_breaks_during_work(self) -> bool {
        !matches!(self, Mode::Focused)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "flexible" | "normal" => Ok(Mode::Flexible),
            "strict" => Ok(Mode::Strict),
            "focused" | "deep-focus" | "deep_focus" => Ok(Mode::Focused),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Session state-machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Working,
    BreakActive,
    /// Strict only.
    Cooldown,
    /// Focused only.
    EndBreak,
    Ended,
    EmergencyExited,
    Abandoned,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Working => "working",
            Phase::BreakActive => "break_active",
            Phase::Cooldown => "cooldown",
            Phase::EndBreak => "end_break",
            Phase::Ended => "ended",
            Phase::EmergencyExited => "emergency_exited",
            Phase::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::Ended | Phase::EmergencyExited | Phase::Abandoned
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-initiated actions gated by the mode policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    TakeBreak,
    Snooze,
    Skip,
    Extend,
    EmergencyExit,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::TakeBreak,
        Action::Snooze,
        Action::Skip,
        Action::Extend,
        Action::EmergencyExit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::TakeBreak => "take_break",
            Action::Snooze => "snooze",
            Action::Skip => "skip",
            Action::Extend => "extend",
            Action::EmergencyExit => "emergency_exit",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Action::TakeBreak => 1 << 0,
            Action::Snooze => 1 << 1,
            Action::Skip => 1 << 2,
            Action::Extend => 1 << 3,
            Action::EmergencyExit => 1 << 4,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Small copyable set of actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ActionSet(u8);

impl ActionSet {
    pub const EMPTY: ActionSet = ActionSet(0);

    pub fn of(actions: &[Action]) -> Self {
        actions.iter().fold(Self::EMPTY, |set, a| set.with(*a))
    }

    #[must_use]
    pub fn with(self, action: Action) -> Self {
        ActionSet(self.0 | action.bit())
    }

    #[must_use]
    pub fn without(self, action: Action) -> Self {
        ActionSet(self.0 & !action.bit())
    }

    pub fn contains(self, action: Action) -> bool {
        self.0 & action.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Action> {
        Action::ALL.into_iter().filter(move |a| self.contains(*a))
    }
}

impl Serialize for ActionSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for ActionSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let actions = Vec::<Action>::deserialize(deserializer)?;
        Ok(ActionSet::of(&actions))
    }
}
