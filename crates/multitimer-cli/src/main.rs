use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "multitimer", version, about = "Run several interval timers at once")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timer management and control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Project time ledger
    Project {
        #[command(subcommand)]
        action: commands::project::ProjectAction,
    },
    /// Weekly hour goals
    Goal {
        #[command(subcommand)]
        action: commands::goal::GoalAction,
    },
    /// Weekly report of booked time against goals
    Week {
        /// Any day in the week, as YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Print shell completions
    Completions {
        shell: Shell,
    },
}

fn main() {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("multitimer=info,multitimer_core=info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action),
        Commands::Project { action } => commands::project::run(action),
        Commands::Goal { action } => commands::goal::run(action),
        Commands::Week { date } => commands::week::run(date),
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "multitimer", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
