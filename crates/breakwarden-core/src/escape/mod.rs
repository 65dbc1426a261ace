//! Escape hatch - sustained key hold that requests an emergency exit.
//!
//! The hatch is a three-state machine driven by discrete events:
//!
//! ```text
//! Idle -> Holding -> Confirmed -> Idle (on release)
//!            \-> Idle (early release or gate closed)
//! ```
//!
//! It knows nothing about sessions. Whoever feeds it decides whether the
//! hatch is available before a hold is allowed to arm.

mod driver;

pub use driver::{spawn_escape_monitor, EscapeGate, EscapeRequest, HoldSignal};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::storage::EscapeHatchConfig;

/// Hatch state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HatchState {
    Idle,
    Holding { since: Instant },
    /// Fired; waiting for the keys to be released.
    Confirmed,
}

/// Snapshot for a UI progress ring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HatchStatus {
    pub holding: bool,
    pub progress: f64,
    pub hold_duration_ms: u64,
}

/// Escape hatch state machine
#[derive(Debug, Clone)]
pub struct EscapeHatch {
    hold: Duration,
    debounce: Duration,
    state: HatchState,
    /// Last release or confirmation, for debouncing.
    settled_at: Option<Instant>,
}

impl Default for EscapeHatch {
    fn default() -> Self {
        Self::new(Duration::from_secs(3), Duration::from_millis(100))
    }
}

impl EscapeHatch {
    pub fn new(hold: Duration, debounce: Duration) -> Self {
        Self {
            hold,
            debounce,
            state: HatchState::Idle,
            settled_at: None,
        }
    }

    pub fn from_config(config: &EscapeHatchConfig) -> Self {
        Self::new(
            Duration::from_millis(config.hold_duration_ms),
            Duration::from_millis(config.debounce_ms),
        )
    }

    pub fn state(&self) -> HatchState {
        self.state
    }

    pub fn hold_duration(&self) -> Duration {
        self.hold
    }

    /// Begin a confirmation window. Returns whether the hold armed.
    ///
    /// Ignored entirely when `available` is false, while a hold or an
    /// unreleased confirmation is in progress, or inside the debounce window.
    pub fn on_key_hold_start(&mut self, now: Instant, available: bool) -> bool {
        if !available {
            tracing::debug!("escape hold ignored: hatch unavailable");
            return false;
        }
        if self.state != HatchState::Idle {
            return false;
        }
        if let Some(settled) = self.settled_at {
            if now.saturating_duration_since(settled) < self.debounce {
                tracing::debug!("escape hold ignored: debounce");
                return false;
            }
        }
        self.state = HatchState::Holding { since: now };
        true
    }

    /// Release. Returns true if an armed hold was cancelled.
    pub fn on_key_hold_end(&mut self, now: Instant) -> bool {
        match self.state {
            HatchState::Holding { .. } => {
                self.state = HatchState::Idle;
                self.settled_at = Some(now);
                true
            }
            HatchState::Confirmed => {
                self.state = HatchState::Idle;
                self.settled_at = Some(now);
                false
            }
            HatchState::Idle => false,
        }
    }

    /// Returns true exactly once when a hold survives the full window.
    pub fn poll(&mut self, now: Instant) -> bool {
        let HatchState::Holding { since } = self.state else {
            return false;
        };
        if now.saturating_duration_since(since) < self.hold {
            return false;
        }
        self.state = HatchState::Confirmed;
        self.settled_at = Some(now);
        true
    }

    /// The gate closed mid-hold. Returns true if a hold was dropped.
    pub fn disarm(&mut self) -> bool {
        if matches!(self.state, HatchState::Holding { .. }) {
            self.state = HatchState::Idle;
            return true;
        }
        false
    }

    /// Instant at which an armed hold confirms.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            HatchState::Holding { since } => Some(since + self.hold),
            _ => None,
        }
    }

    /// 0.0 .. 1.0 while holding.
    pub fn progress(&self, now: Instant) -> f64 {
        match self.state {
            HatchState::Holding { since } if !self.hold.is_zero() => {
                (now.saturating_duration_since(since).as_secs_f64() / self.hold.as_secs_f64())
                    .min(1.0)
            }
            HatchState::Confirmed => 1.0,
            _ => 0.0,
        }
    }

    pub fn status(&self, now: Instant) -> HatchStatus {
        HatchStatus {
            holding: matches!(self.state, HatchState::Holding { .. }),
            progress: self.progress(now),
            hold_duration_ms: self.hold.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Win,
    Cmd,
}

impl Modifier {
    fn parse(key: &str) -> Option<Self> {
        match key {
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "alt" => Some(Modifier::Alt),
            "shift" => Some(Modifier::Shift),
            "win" | "super" => Some(Modifier::Win),
            "cmd" => Some(Modifier::Cmd),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Modifier::Ctrl => "ctrl",
            Modifier::Alt => "alt",
            Modifier::Shift => "shift",
            Modifier::Win => "win",
            Modifier::Cmd => "cmd",
        }
    }
}

/// Key combination that arms the hatch, e.g. `ctrl+alt+shift+e`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCombo {
    pub modifiers: Vec<Modifier>,
    pub keys: Vec<String>,
}

impl KeyCombo {
    /// Parse and validate a `+`-separated combination.
    ///
    /// # Errors
    ///
    /// Returns a message when the combo has fewer than two keys, no
    /// modifier, or an action key that is not a single alphanumeric
    /// character or `f1`..`f24`.
    pub fn parse(combo: &str) -> Result<Self, String> {
        let parts: Vec<String> = combo
            .split('+')
            .map(|k| k.trim().to_lowercase())
            .collect();
        if parts.iter().any(String::is_empty) {
            return Err(format!("empty key in combo '{combo}'"));
        }
        if parts.len() < 2 {
            return Err(format!("combo '{combo}' needs at least two keys"));
        }

        let mut modifiers = Vec::new();
        let mut keys = Vec::new();
        for part in parts {
            if let Some(m) = Modifier::parse(&part) {
                if !modifiers.contains(&m) {
                    modifiers.push(m);
                }
            } else if is_action_key(&part) {
                keys.push(part);
            } else {
                return Err(format!("unknown key '{part}' in combo '{combo}'"));
            }
        }
        if modifiers.is_empty() {
            return Err(format!("combo '{combo}' needs at least one modifier"));
        }
        if keys.is_empty() {
            return Err(format!("combo '{combo}' needs an action key"));
        }
        Ok(Self { modifiers, keys })
    }
}

fn is_action_key(key: &str) -> bool {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => c.is_ascii_alphanumeric(),
        _ => key
            .strip_prefix('f')
            .and_then(|n| n.parse::<u8>().ok())
            .is_some_and(|n| (1..=24).contains(&n)),
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self
            .modifiers
            .iter()
            .map(|m| m.as_str())
            .chain(self.keys.iter().map(String::as_str))
            .collect();
        f.write_str(&parts.join("+"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn full_hold_confirms_once() {
        let t0 = Instant::now();
        let mut hatch = EscapeHatch::default();
        assert!(hatch.on_key_hold_start(t0, true));
        assert!(!hatch.poll(t0 + ms(2999)));
        assert!(hatch.poll(t0 + ms(3000)));
        assert!(!hatch.poll(t0 + ms(4000)));
        assert_eq!(hatch.state(), HatchState::Confirmed);
    }

    #[test]
    fn early_release_never_confirms() {
        let t0 = Instant::now();
        let mut hatch = EscapeHatch::default();
        hatch.on_key_hold_start(t0, true);
        assert!(hatch.on_key_hold_end(t0 + ms(2500)));
        assert!(!hatch.poll(t0 + ms(5000)));
        assert_eq!(hatch.state(), HatchState::Idle);
    }

    #[test]
    fn unavailable_hold_makes_no_progress() {
        let t0 = Instant::now();
        let mut hatch = EscapeHatch::default();
        assert!(!hatch.on_key_hold_start(t0, false));
        assert_eq!(hatch.progress(t0 + ms(1500)), 0.0);
        assert!(!hatch.poll(t0 + ms(5000)));
    }

    #[test]
    fn fresh_hold_required_after_confirmation() {
        let t0 = Instant::now();
        let mut hatch = EscapeHatch::default();
        hatch.on_key_hold_start(t0, true);
        assert!(hatch.poll(t0 + ms(3000)));
        // Still held: a second start is ignored.
        assert!(!hatch.on_key_hold_start(t0 + ms(3500), true));
        hatch.on_key_hold_end(t0 + ms(4000));
        assert!(hatch.on_key_hold_start(t0 + ms(4200), true));
    }

    #[test]
    fn debounce_ignores_rapid_restart() {
        let t0 = Instant::now();
        let mut hatch = EscapeHatch::default();
        hatch.on_key_hold_start(t0, true);
        hatch.on_key_hold_end(t0 + ms(500));
        assert!(!hatch.on_key_hold_start(t0 + ms(550), true));
        assert!(hatch.on_key_hold_start(t0 + ms(600), true));
    }

    #[test]
    fn disarm_drops_hold_silently() {
        let t0 = Instant::now();
        let mut hatch = EscapeHatch::default();
        hatch.on_key_hold_start(t0, true);
        assert!(hatch.disarm());
        assert!(!hatch.poll(t0 + ms(3000)));
        assert!(!hatch.disarm());
    }

    #[test]
    fn progress_tracks_hold() {
        let t0 = Instant::now();
        let mut hatch = EscapeHatch::new(Duration::from_secs(2), ms(100));
        hatch.on_key_hold_start(t0, true);
        assert!((hatch.progress(t0 + ms(500)) - 0.25).abs() < 1e-9);
        assert_eq!(hatch.deadline(), Some(t0 + Duration::from_secs(2)));
        let status = hatch.status(t0 + ms(1000));
        assert!(status.holding);
        assert_eq!(status.hold_duration_ms, 2000);
    }

    #[test]
    fn key_combo_parsing() {
        let combo = KeyCombo::parse("Ctrl+Alt+Shift+E").unwrap();
        assert_eq!(combo.modifiers, vec![Modifier::Ctrl, Modifier::Alt, Modifier::Shift]);
        assert_eq!(combo.keys, vec!["e".to_string()]);
        assert_eq!(combo.to_string(), "ctrl+alt+shift+e");
        assert!(KeyCombo::parse("cmd+f12").is_ok());
    }

    #[test]
    fn key_combo_rejections() {
        assert!(KeyCombo::parse("e").is_err());
        assert!(KeyCombo::parse("a+b").is_err());
        assert!(KeyCombo::parse("ctrl+alt").is_err());
        assert!(KeyCombo::parse("ctrl+f25").is_err());
        assert!(KeyCombo::parse("ctrl+escape").is_err());
        assert!(KeyCombo::parse("ctrl++e").is_err());
    }
}
