pub mod config;
pub mod history;
pub mod modes;
pub mod plan;
pub mod run;
pub mod streaks;

use std::time::Duration;

use breakwarden_core::{CoreError, EnergyPattern, Mode, ModePolicy, Strategy};

pub(crate) fn minutes(m: u64) -> Result<Duration, CoreError> {
    m.checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| CoreError::InvalidDuration(format!("{m} minutes is out of range")))
}

/// Manual placement when a break count is given, then the energy pattern,
/// then auto. A missing break length falls back to the mode's configured
/// break.
pub(crate) fn strategy(
    policy: &ModePolicy,
    mode: Mode,
    breaks: Option<u32>,
    break_min: Option<u64>,
    energy: Option<EnergyPattern>,
) -> Result<Strategy, CoreError> {
    Ok(match (breaks, energy) {
        (Some(count), _) => Strategy::Manual {
            count,
            duration: break_min
                .map(minutes)
                .transpose()?
                .unwrap_or(policy.parameters(mode).break_duration),
        },
        (None, Some(pattern)) => Strategy::Energy { pattern },
        (None, None) => Strategy::Auto,
    })
}
