//! Interactive session runner.
//!
//! Events are printed to stdout as JSON lines. Commands are read from
//! stdin, one per line: `take`, `snooze`, `skip`, `extend <min>`, `hold`,
//! `release`, `cancel`, `status`.

use std::sync::Arc;

use chrono::Utc;
use clap::Args;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use breakwarden_core::session::{
    ChannelNotifier, Collaborators, DeviceControl, RuntimeSettings, SessionHandle, SessionRuntime,
};
use breakwarden_core::streak::{SharedStreaks, StreakSummary};
use breakwarden_core::{
    format_clock, Config, EnergyPattern, Mode, ModePolicy, Phase, Session, StreakLedger, Task,
};

use super::{minutes, strategy};
use crate::store::JsonStore;

#[derive(Args)]
pub struct RunArgs {
    /// Mode: flexible, strict or focused
    pub mode: Mode,
    /// Total work time in minutes
    pub minutes: u64,
    /// Task name
    #[arg(long, default_value = "Focus session")]
    pub name: String,
    /// Place this many breaks evenly instead of using the mode's rhythm
    #[arg(long)]
    pub breaks: Option<u32>,
    /// Length of each manual break in minutes
    #[arg(long, requires = "breaks")]
    pub break_min: Option<u64>,
    /// Place breaks by an energy pattern instead of the mode's rhythm
    #[arg(long, conflicts_with = "breaks")]
    pub energy: Option<EnergyPattern>,
    /// Also print timer ticks
    #[arg(long)]
    pub verbose: bool,
}

/// Phase effects are only logged; a terminal has no overlay to raise.
struct LoggedEffects;

impl DeviceControl for LoggedEffects {
    fn apply_phase_effects(&self, mode: Mode, phase: Phase) -> Result<(), Box<dyn std::error::Error>> {
        tracing::info!(%mode, %phase, "phase effects");
        Ok(())
    }
}

#[derive(Serialize)]
struct Status {
    #[serde(rename = "type")]
    kind: &'static str,
    session_id: String,
    task: String,
    mode: Mode,
    phase: Phase,
    elapsed: String,
    breaks_taken: u32,
    breaks_snoozed: u32,
    breaks_skipped: u32,
    emergency_exits: u32,
    snooze_passes_remaining: u32,
    quality: f64,
}

impl Status {
    fn of(kind: &'static str, session: &Session) -> Self {
        Self {
            kind,
            session_id: session.id.to_string(),
            task: session.task.name.clone(),
            mode: session.mode,
            phase: session.phase,
            elapsed: format_clock(session.elapsed(session.ended_at.unwrap_or_else(Utc::now))),
            breaks_taken: session.breaks_taken,
            breaks_snoozed: session.breaks_snoozed,
            breaks_skipped: session.breaks_skipped,
            emergency_exits: session.emergency_exits,
            snooze_passes_remaining: session.snooze_passes_remaining,
            quality: session.quality_score.unwrap_or_else(|| session.current_quality()),
        }
    }
}

#[derive(Serialize)]
struct Summary {
    #[serde(flatten)]
    status: Status,
    streaks: StreakSummary,
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default()?;
    let policy = ModePolicy::from_config(&config)?;
    let energy = args.energy.or_else(|| config.energy_pattern_for(args.mode));
    let strategy = strategy(&policy, args.mode, args.breaks, args.break_min, energy)?;
    let task = Task::new(args.name, minutes(args.minutes)?, args.mode, strategy)?;

    let store = Arc::new(JsonStore::open()?);
    let streaks = Arc::new(SharedStreaks::new(
        StreakLedger::new(config.calendar_offset()),
        store.load_streaks()?,
    ));
    let settings = RuntimeSettings::from_config(&config);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(drive(task, policy, store, streaks, settings, args.verbose))
}

async fn drive(
    task: Task,
    policy: ModePolicy,
    store: Arc<JsonStore>,
    streaks: Arc<SharedStreaks>,
    settings: RuntimeSettings,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (notifier, mut events) = ChannelNotifier::new();
    let collaborators = Collaborators::silent()
        .with_store(store)
        .with_notifier(Arc::new(notifier))
        .with_device(Arc::new(LoggedEffects));
    let handle = SessionRuntime::spawn(task, &policy, streaks.clone(), collaborators, settings)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if verbose || !event.is_tick() {
                        println!("{}", serde_json::to_string(&event)?);
                    }
                }
                // The notifier closes once every collaborator call is done.
                None => break,
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => command(&handle, line.trim()).await?,
                None => stdin_open = false,
            },
        }
    }

    let session = handle.finished().await?;
    let summary = Summary {
        status: Status::of("Summary", &session),
        streaks: streaks.summary(),
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

async fn command(handle: &SessionHandle, line: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut parts = line.split_whitespace();
    let result = match (parts.next(), parts.next()) {
        (None, _) => return Ok(()),
        (Some("take"), None) => handle.take_break().await,
        (Some("snooze"), None) => handle.snooze().await,
        (Some("skip"), None) => handle.skip().await,
        (Some("extend"), Some(arg)) => match arg.parse::<u64>() {
            Ok(m) => match minutes(m) {
                Ok(by) => handle.extend(by).await,
                Err(e) => Err(e),
            },
            Err(_) => {
                eprintln!("usage: extend <minutes>");
                return Ok(());
            }
        },
        (Some("hold"), None) => {
            handle.hold_start();
            Ok(())
        }
        (Some("release"), None) => {
            handle.hold_end();
            Ok(())
        }
        (Some("cancel"), None) => handle.cancel().await,
        (Some("status"), None) => match handle.snapshot().await {
            Ok(session) => {
                println!("{}", serde_json::to_string(&Status::of("Status", &session))?);
                Ok(())
            }
            Err(e) => Err(e),
        },
        _ => {
            eprintln!("unknown command: {line}");
            return Ok(());
        }
    };
    if let Err(e) = result {
        eprintln!("rejected: {e}");
    }
    Ok(())
}
