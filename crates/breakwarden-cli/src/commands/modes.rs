use clap::Args;

use breakwarden_core::{format_clock, Config, Mode, ModePolicy};

#[derive(Args)]
pub struct ModesArgs {
    /// Show a single mode
    pub mode: Option<Mode>,
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ModesArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default()?;
    let policy = ModePolicy::from_config(&config)?;
    let modes: Vec<Mode> = match args.mode {
        Some(mode) => vec![mode],
        None => Mode::ALL.to_vec(),
    };

    if args.json {
        let rules: Vec<_> = modes.iter().map(|&m| policy.rules(m)).collect();
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    for (i, mode) in modes.into_iter().enumerate() {
        if i > 0 {
            println!();
        }
        let rules = policy.rules(mode);
        let params = &rules.parameters;
        println!("{}", rules.display_name);
        println!("  {}", rules.description);
        println!("  breaks shown: {}", policy.overlay(mode).describe());
        match params.work_interval {
            Some(work) => println!(
                "  rhythm: {} work / {} break",
                format_clock(work),
                format_clock(params.break_duration)
            ),
            None => println!("  rhythm: uninterrupted work"),
        }
        if let Some(snooze) = params.snooze {
            println!(
                "  snooze: {} per pass, {} passes",
                format_clock(snooze.duration),
                snooze.max_passes
            );
        }
        if let Some(cooldown) = params.cooldown {
            println!("  cooldown: {}", format_clock(cooldown));
        }
        if let Some(scale) = &params.end_break {
            let steps: Vec<String> = scale
                .steps
                .iter()
                .map(|s| format!("{}+ -> {}", format_clock(s.from), format_clock(s.rest)))
                .collect();
            println!("  end break: {}", steps.join(", "));
        }
        for (phase, actions) in &rules.allowed {
            let names: Vec<String> = actions.iter().map(|a| a.to_string()).collect();
            let names = if names.is_empty() {
                "-".to_string()
            } else {
                names.join(", ")
            };
            println!("  {phase}: {names}");
        }
        println!("  {}", rules.emergency_exit);
    }
    Ok(())
}
