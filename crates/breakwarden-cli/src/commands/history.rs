use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use breakwarden_core::{format_clock, Mode, Phase, Session};

use crate::store::JsonStore;

#[derive(Args)]
pub struct HistoryArgs {
    /// Show at most this many sessions, newest last
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct Entry {
    id: String,
    task: String,
    mode: Mode,
    phase: Phase,
    started_at: DateTime<Utc>,
    elapsed_secs: u64,
    breaks_taken: u32,
    breaks_skipped: u32,
    quality: Option<f64>,
}

impl Entry {
    fn of(session: &Session) -> Self {
        Self {
            id: session.id.to_string(),
            task: session.task.name.clone(),
            mode: session.mode,
            phase: session.phase,
            started_at: session.started_at,
            elapsed_secs: session.elapsed(session.started_at).as_secs(),
            breaks_taken: session.breaks_taken,
            breaks_skipped: session.breaks_skipped,
            quality: session.quality_score,
        }
    }
}

pub fn run(args: HistoryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let sessions = JsonStore::open()?.load_sessions()?;
    let skip = sessions.len().saturating_sub(args.limit);
    let entries: Vec<Entry> = sessions[skip..].iter().map(Entry::of).collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No sessions yet.");
        return Ok(());
    }
    for entry in &entries {
        let quality = entry
            .quality
            .map(|q| format!("{:.0}%", q * 100.0))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<8} {:<15} {:>8}  {:>4}  {}",
            entry.started_at.format("%Y-%m-%d %H:%M"),
            entry.mode.to_string(),
            entry.phase.to_string(),
            format_clock(std::time::Duration::from_secs(entry.elapsed_secs)),
            quality,
            entry.task
        );
    }
    Ok(())
}
