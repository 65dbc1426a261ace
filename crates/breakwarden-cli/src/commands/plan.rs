use clap::Args;
use serde::Serialize;

use breakwarden_core::scheduler::{self, BreakPlan, ClosingRest, IntervalKind};
use breakwarden_core::{format_clock, Config, EnergyPattern, Mode, ModePolicy};

use super::{minutes, strategy};

#[derive(Args)]
pub struct PlanArgs {
    /// Mode: flexible, strict or focused
    pub mode: Mode,
    /// Total work time in minutes
    pub minutes: u64,
    /// Place this many breaks evenly instead of using the mode's rhythm
    #[arg(long)]
    pub breaks: Option<u32>,
    /// Length of each manual break in minutes
    #[arg(long, requires = "breaks")]
    pub break_min: Option<u64>,
    /// Place breaks by an energy pattern: normal, morning_person,
    /// afternoon_slump or night_owl
    #[arg(long, conflicts_with = "breaks")]
    pub energy: Option<EnergyPattern>,
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct IntervalView {
    kind: IntervalKind,
    start: String,
    offset_secs: u64,
    duration_secs: u64,
}

#[derive(Serialize)]
struct ClosingView {
    kind: &'static str,
    duration_secs: u64,
}

#[derive(Serialize)]
struct PlanView {
    mode: Mode,
    total_secs: u64,
    breaks: usize,
    intervals: Vec<IntervalView>,
    closing_rest: Option<ClosingView>,
}

impl PlanView {
    fn new(plan: &BreakPlan, total_secs: u64) -> Self {
        Self {
            mode: plan.mode,
            total_secs,
            breaks: plan.breaks().count(),
            intervals: plan
                .intervals
                .iter()
                .map(|i| IntervalView {
                    kind: i.kind,
                    start: format_clock(i.offset),
                    offset_secs: i.offset.as_secs(),
                    duration_secs: i.duration.as_secs(),
                })
                .collect(),
            closing_rest: plan.closing_rest.map(|rest| ClosingView {
                kind: match rest {
                    ClosingRest::Cooldown(_) => "cooldown",
                    ClosingRest::EndBreak(_) => "end_break",
                },
                duration_secs: rest.duration().as_secs(),
            }),
        }
    }
}

pub fn run(args: PlanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default()?;
    let policy = ModePolicy::from_config(&config)?;
    let total = minutes(args.minutes)?;
    let energy = args.energy.or_else(|| config.energy_pattern_for(args.mode));
    let strategy = strategy(&policy, args.mode, args.breaks, args.break_min, energy)?;
    let plan = scheduler::plan(total, policy.parameters(args.mode), &strategy)?;
    let view = PlanView::new(&plan, total.as_secs());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("{} ({} min)", ModePolicy::display_name(args.mode), args.minutes);
    for interval in &plan.intervals {
        let label = match interval.kind {
            IntervalKind::Work => "work",
            IntervalKind::Break => "break",
        };
        println!(
            "  {:>8}  {:<6} {}",
            format_clock(interval.offset),
            label,
            format_clock(interval.duration)
        );
    }
    if let Some(rest) = view.closing_rest {
        println!(
            "  {:>8}  {:<6} {}",
            format_clock(plan.end()),
            rest.kind,
            format_clock(std::time::Duration::from_secs(rest.duration_secs))
        );
    }
    Ok(())
}
