//! JSON file persistence for finished sessions and streaks.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use breakwarden_core::session::SessionStore;
use breakwarden_core::storage::data_dir;
use breakwarden_core::{Session, StreakState};

const SESSIONS_FILE: &str = "sessions.jsonl";
const STREAKS_FILE: &str = "streaks.json";

/// Appends sessions to `sessions.jsonl` and rewrites `streaks.json`.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::at(data_dir()?))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Saved streaks, or defaults when nothing has been saved yet.
    pub fn load_streaks(&self) -> Result<StreakState, Box<dyn std::error::Error>> {
        let path = self.dir.join(STREAKS_FILE);
        if !path.exists() {
            return Ok(StreakState::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Every finished session, oldest first. Unreadable lines are skipped.
    pub fn load_sessions(&self) -> Result<Vec<Session>, Box<dyn std::error::Error>> {
        let path = self.dir.join(SESSIONS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable session record");
                    None
                }
            })
            .collect())
    }
}

impl SessionStore for JsonStore {
    fn save_session(&self, session: &Session) -> Result<(), Box<dyn std::error::Error>> {
        let line = serde_json::to_string(session)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(SESSIONS_FILE))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn save_streaks(&self, state: &StreakState) -> Result<(), Box<dyn std::error::Error>> {
        let path = self.dir.join(STREAKS_FILE);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}
