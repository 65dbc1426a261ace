use chrono::Utc;
use clap::Subcommand;
use serde::Serialize;

use breakwarden_core::session::SessionStore;
use breakwarden_core::streak::{DailyRisk, StreakKind, StreakSummary};
use breakwarden_core::{Config, StreakLedger};

use crate::store::JsonStore;

#[derive(Subcommand)]
pub enum StreaksAction {
    /// Show current and best streaks
    Show {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Reset one streak's current count (best is kept)
    Reset {
        /// session, perfect or daily
        kind: StreakKind,
    },
}

#[derive(Serialize)]
struct Report {
    #[serde(flatten)]
    summary: StreakSummary,
    daily_risk: Option<DailyRisk>,
}

pub fn run(action: StreaksAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default()?;
    let ledger = StreakLedger::new(config.calendar_offset());
    let store = JsonStore::open()?;
    let mut state = store.load_streaks()?;

    match action {
        StreaksAction::Show { json } => {
            let report = Report {
                summary: ledger.summary(&state),
                daily_risk: ledger.daily_risk(&state, Utc::now()),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            for status in [&report.summary.session, &report.summary.perfect, &report.summary.daily] {
                println!("{:<8} {}", status.kind.as_str(), status.display);
            }
            if let Some(risk) = report.daily_risk {
                println!("{}", risk.message);
            }
        }
        StreaksAction::Reset { kind } => {
            ledger.reset(&mut state, kind);
            store.save_streaks(&state)?;
            println!("{} streak reset", kind.as_str());
        }
    }
    Ok(())
}
