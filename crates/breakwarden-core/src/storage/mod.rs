mod config;

pub use config::{
    Config, EndBreakStepConfig, EscapeHatchConfig, FlexibleConfig, FocusedConfig, ScheduleConfig,
    StreaksConfig, StrictConfig, TimerConfig, MAX_HOLD_MS, MIN_HOLD_MS,
};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/breakwarden[-dev]/` based on BREAKWARDEN_ENV.
///
/// Set BREAKWARDEN_ENV=dev to use development data directory.
/// BREAKWARDEN_DATA_DIR overrides both.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os("BREAKWARDEN_DATA_DIR") {
        let dir = PathBuf::from(dir);
        std::fs::create_dir_all(&dir)
            .map_err(|e| ConfigError::NoDataDir(format!("{}: {e}", dir.display())))?;
        return Ok(dir);
    }

    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("BREAKWARDEN_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("breakwarden-dev")
    } else {
        base_dir.join("breakwarden")
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::NoDataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
