//! TOML-based application configuration.
//!
//! Stores the per-mode parameter table, escape hatch settings and timer
//! tuning. Configuration is stored at `~/.config/breakwarden/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::escape::KeyCombo;
use crate::policy::Mode;
use crate::scheduler::EnergyPattern;

/// Flexible mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlexibleConfig {
    #[serde(default = "default_flexible_work")]
    pub work_interval_min: u32,
    #[serde(default = "default_flexible_break")]
    pub break_duration_min: u32,
    #[serde(default = "default_snooze")]
    pub snooze_duration_min: u32,
    /// Zero disables snoozing.
    #[serde(default = "default_snooze_passes")]
    pub max_snooze_passes: u32,
    #[serde(default = "default_true")]
    pub allow_skip: bool,
}

/// Strict mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrictConfig {
    #[serde(default = "default_strict_work")]
    pub work_interval_min: u32,
    #[serde(default = "default_strict_break")]
    pub break_duration_min: u32,
    #[serde(default = "default_cooldown")]
    pub cooldown_min: u32,
}

/// One row of the focused end-break table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndBreakStepConfig {
    /// Total work (minutes) at which this row starts applying.
    pub from_min: u32,
    pub break_min: u32,
}

/// Focused (deep-focus) mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusedConfig {
    /// End-break used when scaling is disabled.
    #[serde(default = "default_mandatory_break")]
    pub mandatory_break_min: u32,
    #[serde(default = "default_true")]
    pub scaling_enabled: bool,
    #[serde(default = "default_end_break_steps")]
    pub end_break_steps: Vec<EndBreakStepConfig>,
}

/// Escape hatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscapeHatchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_key_combo")]
    pub key_combo: String,
    #[serde(default = "default_hold_ms")]
    pub hold_duration_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Countdown driver tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_interval_ms: u64,
    /// Break-ending-soon warning threshold. Zero disables the warning.
    #[serde(default = "default_warning_secs")]
    pub break_warning_secs: u64,
}

/// Break placement settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Place breaks by energy pattern instead of the fixed rhythm.
    #[serde(default)]
    pub energy_aware: bool,
    #[serde(default)]
    pub energy_pattern: EnergyPattern,
}

/// Streak bookkeeping settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreaksConfig {
    /// Calendar-day offset from UTC in minutes; local offset when unset.
    #[serde(default)]
    pub utc_offset_min: Option<i32>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/breakwarden/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub flexible: FlexibleConfig,
    #[serde(default)]
    pub strict: StrictConfig,
    #[serde(default)]
    pub focused: FocusedConfig,
    #[serde(default)]
    pub escape_hatch: EscapeHatchConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub streaks: StreaksConfig,
}

// Default functions
fn default_flexible_work() -> u32 {
    25
}
fn default_flexible_break() -> u32 {
    5
}
fn default_snooze() -> u32 {
    5
}
fn default_snooze_passes() -> u32 {
    3
}
fn default_strict_work() -> u32 {
    52
}
fn default_strict_break() -> u32 {
    17
}
fn default_cooldown() -> u32 {
    20
}
fn default_mandatory_break() -> u32 {
    30
}
fn default_end_break_steps() -> Vec<EndBreakStepConfig> {
    vec![
        EndBreakStepConfig { from_min: 0, break_min: 30 },
        EndBreakStepConfig { from_min: 120, break_min: 45 },
        EndBreakStepConfig { from_min: 240, break_min: 60 },
    ]
}
fn default_key_combo() -> String {
    "ctrl+alt+shift+e".into()
}
fn default_hold_ms() -> u64 {
    3000
}
fn default_debounce_ms() -> u64 {
    100
}
fn default_tick_ms() -> u64 {
    1000
}
fn default_warning_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

impl Default for FlexibleConfig {
    fn default() -> Self {
        Self {
            work_interval_min: default_flexible_work(),
            break_duration_min: default_flexible_break(),
            snooze_duration_min: default_snooze(),
            max_snooze_passes: default_snooze_passes(),
            allow_skip: true,
        }
    }
}

impl Default for StrictConfig {
    fn default() -> Self {
        Self {
            work_interval_min: default_strict_work(),
            break_duration_min: default_strict_break(),
            cooldown_min: default_cooldown(),
        }
    }
}

impl Default for FocusedConfig {
    fn default() -> Self {
        Self {
            mandatory_break_min: default_mandatory_break(),
            scaling_enabled: true,
            end_break_steps: default_end_break_steps(),
        }
    }
}

impl Default for EscapeHatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_combo: default_key_combo(),
            hold_duration_ms: default_hold_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_ms(),
            break_warning_secs: default_warning_secs(),
        }
    }
}

/// Bounds for the escape hatch hold window.
pub const MIN_HOLD_MS: u64 = 1000;
pub const MAX_HOLD_MS: u64 = 5000;

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;

            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value
                        .parse::<bool>()
                        .map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(_) => {
                    if let Ok(n) = value.parse::<u64>() {
                        serde_json::Value::Number(n.into())
                    } else if let Ok(n) = value.parse::<i64>() {
                        serde_json::Value::Number(n.into())
                    } else {
                        return Err(invalid(format!("cannot parse '{value}' as integer")));
                    }
                }
                // Optional numbers serialize as null when unset.
                serde_json::Value::Null => match value.parse::<i64>() {
                    Ok(n) => serde_json::Value::Number(n.into()),
                    Err(_) if value == "none" => serde_json::Value::Null,
                    Err(_) => return Err(invalid(format!("cannot parse '{value}' as integer"))),
                },
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                }
                serde_json::Value::String(_) => serde_json::Value::String(value.into()),
            };

            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            Ok(cfg)
        }
    }

    /// Load and validate a config file at an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let cfg: Config = toml::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Persist to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load from the default location without writing anything.
    /// Defaults are used only when no config file exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        Self::load_from_or_default(&Self::path()?)
    }

    /// [`Config::load_or_default`] for an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load_from_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load_from(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key. The updated config must still validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the resulting configuration is invalid. `self` is left unchanged
    /// on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Check every value the policy and escape hatch rely on.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |key: &str, value: u64| {
            if value == 0 {
                Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be positive".into(),
                })
            } else {
                Ok(())
            }
        };

        positive("flexible.work_interval_min", self.flexible.work_interval_min.into())?;
        positive("flexible.break_duration_min", self.flexible.break_duration_min.into())?;
        if self.flexible.max_snooze_passes > 0 {
            positive("flexible.snooze_duration_min", self.flexible.snooze_duration_min.into())?;
        }
        positive("strict.work_interval_min", self.strict.work_interval_min.into())?;
        positive("strict.break_duration_min", self.strict.break_duration_min.into())?;
        positive("strict.cooldown_min", self.strict.cooldown_min.into())?;
        positive("focused.mandatory_break_min", self.focused.mandatory_break_min.into())?;
        positive("timer.tick_interval_ms", self.timer.tick_interval_ms)?;

        for (i, pair) in self.focused.end_break_steps.windows(2).enumerate() {
            if pair[1].from_min < pair[0].from_min || pair[1].break_min < pair[0].break_min {
                return Err(ConfigError::InvalidValue {
                    key: format!("focused.end_break_steps[{}]", i + 1),
                    message: "steps must be non-decreasing in threshold and break length".into(),
                });
            }
        }
        for (i, step) in self.focused.end_break_steps.iter().enumerate() {
            positive(&format!("focused.end_break_steps[{i}].break_min"), step.break_min.into())?;
        }

        let hold = self.escape_hatch.hold_duration_ms;
        if !(MIN_HOLD_MS..=MAX_HOLD_MS).contains(&hold) {
            return Err(ConfigError::InvalidValue {
                key: "escape_hatch.hold_duration_ms".into(),
                message: format!("must be between {MIN_HOLD_MS} and {MAX_HOLD_MS}"),
            });
        }
        KeyCombo::parse(&self.escape_hatch.key_combo).map_err(|message| {
            ConfigError::InvalidValue {
                key: "escape_hatch.key_combo".into(),
                message,
            }
        })?;

        if let Some(offset) = self.streaks.utc_offset_min {
            if offset.abs() >= 24 * 60 {
                return Err(ConfigError::InvalidValue {
                    key: "streaks.utc_offset_min".into(),
                    message: "must be within one day of UTC".into(),
                });
            }
        }
        Ok(())
    }

    /// Energy pattern to plan with when no explicit strategy is given.
    /// Only modes with breaks during work use it.
    pub fn energy_pattern_for(&self, mode: Mode) -> Option<EnergyPattern> {
        (self.schedule.energy_aware && mode.has_breaks_during_work())
            .then_some(self.schedule.energy_pattern)
    }

    /// Calendar offset used for daily streaks.
    pub fn calendar_offset(&self) -> chrono::FixedOffset {
        self.streaks
            .utc_offset_min
            .and_then(|m| chrono::FixedOffset::east_opt(m * 60))
            .unwrap_or_else(|| *chrono::Local::now().offset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.flexible.work_interval_min, 25);
        assert_eq!(parsed.focused.end_break_steps, default_end_break_steps());
    }

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: Config = toml::from_str("[strict]\ncooldown_min = 10\n").unwrap();
        assert_eq!(cfg.strict.cooldown_min, 10);
        assert_eq!(cfg.strict.work_interval_min, 52);
        assert_eq!(cfg.escape_hatch.hold_duration_ms, 3000);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("flexible.allow_skip").as_deref(), Some("true"));
        assert_eq!(cfg.get("strict.cooldown_min").as_deref(), Some("20"));
        assert_eq!(cfg.get("escape_hatch.key_combo").as_deref(), Some("ctrl+alt+shift+e"));
        assert!(cfg.get("strict.missing_key").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.set("flexible.allow_skip", "false").unwrap();
        cfg.set("strict.cooldown_min", "15").unwrap();
        assert!(!cfg.flexible.allow_skip);
        assert_eq!(cfg.strict.cooldown_min, 15);
    }

    #[test]
    fn set_optional_offset() {
        let mut cfg = Config::default();
        cfg.set("streaks.utc_offset_min", "-300").unwrap();
        assert_eq!(cfg.streaks.utc_offset_min, Some(-300));
        assert_eq!(cfg.calendar_offset().local_minus_utc(), -300 * 60);
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("strict.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn set_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(cfg.set("flexible.allow_skip", "not_a_bool").is_err());
        assert!(cfg.set("strict.cooldown_min", "soon").is_err());
    }

    #[test]
    fn set_rejects_values_that_fail_validation() {
        let mut cfg = Config::default();
        assert!(cfg.set("strict.cooldown_min", "0").is_err());
        assert!(cfg.set("escape_hatch.hold_duration_ms", "9000").is_err());
        assert!(cfg.set("escape_hatch.key_combo", "e").is_err());
        assert_eq!(cfg.strict.cooldown_min, 20);
    }

    #[test]
    fn non_monotonic_steps_fail_validation() {
        let mut cfg = Config::default();
        cfg.focused.end_break_steps = vec![
            EndBreakStepConfig { from_min: 0, break_min: 60 },
            EndBreakStepConfig { from_min: 120, break_min: 30 },
        ];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_and_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.flexible.max_snooze_passes = 1;
        cfg.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.flexible.max_snooze_passes, 1);
    }

    #[test]
    fn missing_file_loads_defaults_but_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from_or_default(&path).unwrap();
        assert_eq!(cfg.strict.cooldown_min, 20);
        assert!(!path.exists());

        std::fs::write(&path, "[strict]\ncooldown_min = 0\n").unwrap();
        let err = Config::load_from_or_default(&path).unwrap_err();
        assert!(err.to_string().contains("strict.cooldown_min"));
    }

    #[test]
    fn energy_pattern_is_configurable() {
        let mut cfg = Config::default();
        assert_eq!(cfg.energy_pattern_for(Mode::Flexible), None);
        cfg.set("schedule.energy_aware", "true").unwrap();
        cfg.set("schedule.energy_pattern", "night_owl").unwrap();
        assert_eq!(cfg.energy_pattern_for(Mode::Strict), Some(EnergyPattern::NightOwl));
        assert_eq!(cfg.energy_pattern_for(Mode::Focused), None);
        assert!(cfg.set("schedule.energy_pattern", "lark").is_err());
        assert_eq!(cfg.schedule.energy_pattern, EnergyPattern::NightOwl);
    }

    #[test]
    fn load_from_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[timer]\ntick_interval_ms = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
