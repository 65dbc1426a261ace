use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod store;

#[derive(Parser)]
#[command(name = "breakwarden-cli", version, about = "Breakwarden CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Preview the break plan for a session
    Plan(commands::plan::PlanArgs),
    /// Show what each mode allows
    Modes(commands::modes::ModesArgs),
    /// Run a session, reading commands from stdin
    Run(commands::run::RunArgs),
    /// List finished sessions
    History(commands::history::HistoryArgs),
    /// Streak status
    Streaks {
        #[command(subcommand)]
        action: commands::streaks::StreaksAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("BREAKWARDEN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Plan(args) => commands::plan::run(args),
        Commands::Modes(args) => commands::modes::run(args),
        Commands::Run(args) => commands::run::run(args),
        Commands::History(args) => commands::history::run(args),
        Commands::Streaks { action } => commands::streaks::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
