//! Mode policy: the single table deciding what each mode allows.
//!
//! Modes are plain data. The session manager never branches on a mode to
//! decide whether an action is legal; it asks [`ModePolicy::allowed_actions`]
//! and rejects anything outside the returned set.

mod mode;

pub use mode::{Action, ActionSet, Mode, Phase};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;
use crate::storage::Config;

/// How a break surface should be presented by the UI collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overlay {
    SmallMovable,
    FullScreen,
}

impl Overlay {
    pub fn describe(self) -> &'static str {
        match self {
            Overlay::SmallMovable => "small movable window",
            Overlay::FullScreen => "full screen",
        }
    }
}

/// Snooze rules (flexible mode only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnoozeRules {
    /// How long a snooze pushes the break back.
    pub duration: Duration,
    /// Snoozes allowed per session (restored when the session is extended).
    pub max_passes: u32,
}

/// One threshold of the focused end-break step function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndBreakStep {
    /// Work totals at or above this threshold use `rest`.
    pub from: Duration,
    pub rest: Duration,
}

/// Monotonic step function from total work time to mandatory end-break.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndBreakScale {
    pub enabled: bool,
    /// Used when scaling is disabled or no step matches.
    pub fallback: Duration,
    pub steps: Vec<EndBreakStep>,
}

impl EndBreakScale {
    pub fn duration_for(&self, total_work: Duration) -> Duration {
        if !self.enabled {
            return self.fallback;
        }
        self.steps
            .iter()
            .filter(|s| s.from <= total_work)
            .last()
            .map(|s| s.rest)
            .unwrap_or(self.fallback)
    }

    /// Steps must be ordered and never shrink the rest as work grows.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fallback.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "focused.mandatory_break_min".into(),
                message: "must be positive".into(),
            });
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.rest.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key: format!("focused.end_break_steps[{i}].break_min"),
                    message: "must be positive".into(),
                });
            }
            if let Some(prev) = i.checked_sub(1).map(|p| &self.steps[p]) {
                if step.from < prev.from || step.rest < prev.rest {
                    return Err(ConfigError::InvalidValue {
                        key: format!("focused.end_break_steps[{i}]"),
                        message: "steps must be non-decreasing in threshold and break length"
                            .into(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Immutable behaviour parameters for one mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeParameters {
    pub mode: Mode,
    /// Work between in-session breaks. `None` when the mode has none.
    pub work_interval: Option<Duration>,
    /// Length of an in-session break.
    pub break_duration: Duration,
    pub snooze: Option<SnoozeRules>,
    pub allow_skip: bool,
    /// Strict closing cooldown.
    pub cooldown: Option<Duration>,
    /// Focused closing end-break.
    pub end_break: Option<EndBreakScale>,
    /// Phases in which the escape hatch may arm.
    pub escape_phases: Vec<Phase>,
    pub overlay: Overlay,
}

impl ModeParameters {
    /// Closing rest for a session with `total_work` of work.
    pub fn closing_rest(&self, total_work: Duration) -> Option<Duration> {
        match self.mode {
            Mode::Flexible => None,
            Mode::Strict => self.cooldown,
            Mode::Focused => self.end_break.as_ref().map(|s| s.duration_for(total_work)),
        }
    }
}

/// Lookup table for all three modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModePolicy {
    flexible: ModeParameters,
    strict: ModeParameters,
    focused: ModeParameters,
}

impl Default for ModePolicy {
    fn default() -> Self {
        // Config defaults are validated by tests; fall back to them directly.
        Self::from_config(&Config::default()).unwrap_or_else(|_| Self::builtin())
    }
}

impl ModePolicy {
    fn builtin() -> Self {
        let min = |m: u64| Duration::from_secs(m * 60);
        Self {
            flexible: ModeParameters {
                mode: Mode::Flexible,
                work_interval: Some(min(25)),
                break_duration: min(5),
                snooze: Some(SnoozeRules {
                    duration: min(5),
                    max_passes: 3,
                }),
                allow_skip: true,
                cooldown: None,
                end_break: None,
                escape_phases: Vec::new(),
                overlay: Overlay::SmallMovable,
            },
            strict: ModeParameters {
                mode: Mode::Strict,
                work_interval: Some(min(52)),
                break_duration: min(17),
                snooze: None,
                allow_skip: false,
                cooldown: Some(min(20)),
                end_break: None,
                escape_phases: vec![Phase::BreakActive, Phase::Cooldown],
                overlay: Overlay::FullScreen,
            },
            focused: ModeParameters {
                mode: Mode::Focused,
                work_interval: None,
                break_duration: min(30),
                snooze: None,
                allow_skip: false,
                cooldown: None,
                end_break: Some(EndBreakScale {
                    enabled: true,
                    fallback: min(30),
                    steps: vec![
                        EndBreakStep { from: min(0), rest: min(30) },
                        EndBreakStep { from: min(120), rest: min(45) },
                        EndBreakStep { from: min(240), rest: min(60) },
                    ],
                }),
                escape_phases: vec![Phase::BreakActive, Phase::EndBreak],
                overlay: Overlay::FullScreen,
            },
        }
    }

    /// Build the table from user configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configured duration is zero or the focused
    /// step function is not monotonic.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let min = |m: u32| Duration::from_secs(u64::from(m) * 60);

        let flex = &config.flexible;
        let strict = &config.strict;
        let focused = &config.focused;

        let scale = EndBreakScale {
            enabled: focused.scaling_enabled,
            fallback: min(focused.mandatory_break_min),
            steps: focused
                .end_break_steps
                .iter()
                .map(|s| EndBreakStep {
                    from: min(s.from_min),
                    rest: min(s.break_min),
                })
                .collect(),
        };
        scale.validate()?;

        let mut policy = Self::builtin();
        policy.flexible.work_interval = Some(min(flex.work_interval_min));
        policy.flexible.break_duration = min(flex.break_duration_min);
        policy.flexible.snooze = (flex.max_snooze_passes > 0).then(|| SnoozeRules {
            duration: min(flex.snooze_duration_min),
            max_passes: flex.max_snooze_passes,
        });
        policy.flexible.allow_skip = flex.allow_skip;

        policy.strict.work_interval = Some(min(strict.work_interval_min));
        policy.strict.break_duration = min(strict.break_duration_min);
        policy.strict.cooldown = Some(min(strict.cooldown_min));

        policy.focused.break_duration = min(focused.mandatory_break_min);
        policy.focused.end_break = Some(scale);

        Ok(policy)
    }

    pub fn parameters(&self, mode: Mode) -> &ModeParameters {
        match mode {
            Mode::Flexible => &self.flexible,
            Mode::Strict => &self.strict,
            Mode::Focused => &self.focused,
        }
    }

    /// Actions a user may take in `phase` under `mode`.
    pub fn allowed_actions(&self, mode: Mode, phase: Phase) -> ActionSet {
        let params = self.parameters(mode);
        let mut set = match (mode, phase) {
            (Mode::Flexible, Phase::Working) | (Mode::Focused, Phase::Working) => {
                ActionSet::of(&[Action::Extend])
            }
            (Mode::Flexible, Phase::BreakActive) => {
                let mut set = ActionSet::of(&[Action::TakeBreak]);
                if params.snooze.is_some() {
                    set = set.with(Action::Snooze);
                }
                if params.allow_skip {
                    set = set.with(Action::Skip);
                }
                set
            }
            _ => ActionSet::EMPTY,
        };
        if self.is_escape_available(mode, phase) {
            set = set.with(Action::EmergencyExit);
        }
        set
    }

    /// Gate queried by the escape hatch before arming.
    pub fn is_escape_available(&self, mode: Mode, phase: Phase) -> bool {
        mode != Mode::Flexible && self.parameters(mode).escape_phases.contains(&phase)
    }

    pub fn overlay(&self, mode: Mode) -> Overlay {
        self.parameters(mode).overlay
    }

    pub fn display_name(mode: Mode) -> &'static str {
        match mode {
            Mode::Flexible => "Flexible mode",
            Mode::Strict => "Strict mode",
            Mode::Focused => "Deep-focus mode",
        }
    }

    pub fn description(mode: Mode) -> &'static str {
        match mode {
            Mode::Flexible => "Flexible breaks - can snooze or skip, can extend the session",
            Mode::Strict => "Enforced breaks - no snooze or skip, mandatory cooldown at the end",
            Mode::Focused => "No interruptions - pure focus, mandatory break at the end",
        }
    }

    pub fn emergency_exit_consequence(mode: Mode) -> &'static str {
        match mode {
            Mode::Flexible => "Emergency exit is not available in flexible mode",
            Mode::Strict | Mode::Focused => {
                "Emergency exit breaks your perfect-session streak, counts as a skipped break \
                 and reduces the session quality score"
            }
        }
    }

    /// Serializable summary used by the CLI `modes` command.
    pub fn rules(&self, mode: Mode) -> ModeRules {
        let params = self.parameters(mode).clone();
        let allowed = [
            Phase::Working,
            Phase::BreakActive,
            Phase::Cooldown,
            Phase::EndBreak,
        ]
        .into_iter()
        .map(|phase| (phase, self.allowed_actions(mode, phase)))
        .filter(|(_, set)| !set.is_empty())
        .collect();
        ModeRules {
            display_name: Self::display_name(mode).to_string(),
            description: Self::description(mode).to_string(),
            emergency_exit: Self::emergency_exit_consequence(mode).to_string(),
            allowed,
            parameters: params,
        }
    }
}

/// Human-facing rule summary for one mode.
#[derive(Debug, Clone, Serialize)]
pub struct ModeRules {
    pub display_name: String,
    pub description: String,
    pub emergency_exit: String,
    pub allowed: Vec<(Phase, ActionSet)>,
    pub parameters: ModeParameters,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn min(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    #[test]
    fn default_policy_matches_builtin_table() {
        assert_eq!(ModePolicy::default(), ModePolicy::builtin());
    }

    #[test]
    fn only_flexible_breaks_use_the_small_window() {
        let policy = ModePolicy::default();
        assert_eq!(policy.overlay(Mode::Flexible), Overlay::SmallMovable);
        assert_eq!(policy.overlay(Mode::Strict), Overlay::FullScreen);
        assert_eq!(policy.overlay(Mode::Focused).describe(), "full screen");
    }

    #[test]
    fn strict_and_focused_never_offer_snooze_or_skip() {
        let policy = ModePolicy::default();
        for mode in [Mode::Strict, Mode::Focused] {
            for phase in [Phase::Working, Phase::BreakActive, Phase::Cooldown, Phase::EndBreak] {
                let set = policy.allowed_actions(mode, phase);
                assert!(!set.contains(Action::Snooze), "{mode} {phase}");
                assert!(!set.contains(Action::Skip), "{mode} {phase}");
            }
        }
    }

    #[test]
    fn flexible_never_offers_emergency_exit() {
        let policy = ModePolicy::default();
        for phase in [Phase::Working, Phase::BreakActive, Phase::Cooldown, Phase::EndBreak] {
            assert!(!policy
                .allowed_actions(Mode::Flexible, phase)
                .contains(Action::EmergencyExit));
            assert!(!policy.is_escape_available(Mode::Flexible, phase));
        }
    }

    #[test]
    fn flexible_break_offers_take_snooze_skip() {
        let policy = ModePolicy::default();
        let set = policy.allowed_actions(Mode::Flexible, Phase::BreakActive);
        assert!(set.contains(Action::TakeBreak));
        assert!(set.contains(Action::Snooze));
        assert!(set.contains(Action::Skip));
        assert!(!set.contains(Action::Extend));
    }

    #[test]
    fn escape_gate_follows_rest_phases() {
        let policy = ModePolicy::default();
        assert!(policy.is_escape_available(Mode::Strict, Phase::BreakActive));
        assert!(policy.is_escape_available(Mode::Strict, Phase::Cooldown));
        assert!(!policy.is_escape_available(Mode::Strict, Phase::Working));
        assert!(policy.is_escape_available(Mode::Focused, Phase::EndBreak));
        assert!(!policy.is_escape_available(Mode::Focused, Phase::Working));
        assert!(!policy.is_escape_available(Mode::Strict, Phase::Ended));
    }

    #[test]
    fn terminal_phases_allow_nothing() {
        let policy = ModePolicy::default();
        for mode in Mode::ALL {
            for phase in [Phase::Ended, Phase::EmergencyExited, Phase::Abandoned] {
                assert!(policy.allowed_actions(mode, phase).is_empty());
            }
        }
    }

    #[test]
    fn extend_only_for_flexible_and_focused_work() {
        let policy = ModePolicy::default();
        assert!(policy.allowed_actions(Mode::Flexible, Phase::Working).contains(Action::Extend));
        assert!(policy.allowed_actions(Mode::Focused, Phase::Working).contains(Action::Extend));
        assert!(!policy.allowed_actions(Mode::Strict, Phase::Working).contains(Action::Extend));
    }

    #[test]
    fn end_break_scale_is_a_step_function() {
        let scale = ModePolicy::default().focused.end_break.unwrap();
        assert_eq!(scale.duration_for(min(90)), min(30));
        assert_eq!(scale.duration_for(min(120)), min(45));
        assert_eq!(scale.duration_for(min(239)), min(45));
        assert_eq!(scale.duration_for(min(480)), min(60));
    }

    #[test]
    fn disabled_scale_uses_fallback() {
        let mut scale = ModePolicy::default().focused.end_break.unwrap();
        scale.enabled = false;
        assert_eq!(scale.duration_for(min(480)), min(30));
    }

    #[test]
    fn non_monotonic_scale_is_rejected() {
        let scale = EndBreakScale {
            enabled: true,
            fallback: min(30),
            steps: vec![
                EndBreakStep { from: min(0), rest: min(45) },
                EndBreakStep { from: min(120), rest: min(30) },
            ],
        };
        assert!(scale.validate().is_err());
    }

    #[test]
    fn config_without_snooze_passes_disables_snooze() {
        let mut config = Config::default();
        config.flexible.max_snooze_passes = 0;
        config.flexible.allow_skip = false;
        let policy = ModePolicy::from_config(&config).unwrap();
        let set = policy.allowed_actions(Mode::Flexible, Phase::BreakActive);
        assert!(!set.contains(Action::Snooze));
        assert!(!set.contains(Action::Skip));
        assert!(set.contains(Action::TakeBreak));
    }

    #[test]
    fn closing_rest_per_mode() {
        let policy = ModePolicy::default();
        assert_eq!(policy.parameters(Mode::Flexible).closing_rest(min(60)), None);
        assert_eq!(policy.parameters(Mode::Strict).closing_rest(min(60)), Some(min(20)));
        assert_eq!(policy.parameters(Mode::Focused).closing_rest(min(150)), Some(min(45)));
    }

    #[test]
    fn rules_list_only_phases_with_actions() {
        let rules = ModePolicy::default().rules(Mode::Strict);
        let phases: Vec<Phase> = rules.allowed.iter().map(|(p, _)| *p).collect();
        assert_eq!(phases, vec![Phase::BreakActive, Phase::Cooldown]);
        assert_eq!(rules.display_name, "Strict mode");
    }
}
