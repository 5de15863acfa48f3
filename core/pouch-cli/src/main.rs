//! pouch: command-line front end for pouch session timers.
//!
//! ## Subcommands
//!
//! - `start`, `pause`, `resume`, `stop`: lifecycle transitions
//! - `status`: current remaining time and progress
//! - `watch`: foreground timer, ticks every second and commits completion
//! - `sweep`: one background reconcile pass (for hosts that run a command
//!   on a schedule instead of the daemon)

mod commands;
mod logging;

use clap::{Parser, Subcommand};
use pouch_core::SessionId;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pouch")]
#[command(about = "Pouch session timer")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $POUCH_CONFIG or ~/.pouch/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new session
    Start {
        /// Target active minutes (defaults to `default_target_minutes`)
        #[arg(long, short)]
        minutes: Option<u32>,
    },

    /// Pause the running session
    Pause {
        /// Session id (defaults to the current active session)
        #[arg(long)]
        id: Option<String>,
    },

    /// Resume a paused session
    Resume {
        #[arg(long)]
        id: Option<String>,
    },

    /// Stop a session without completing it
    Stop {
        #[arg(long)]
        id: Option<String>,
    },

    /// Show remaining time and progress
    Status {
        #[arg(long)]
        id: Option<String>,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the foreground timer until the session completes or leaves the running state
    Watch {
        #[arg(long)]
        id: Option<String>,
    },

    /// Run one background completion sweep
    Sweep,
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    let context = match commands::Context::load(cli.config) {
        Ok(context) => context,
        Err(err) => {
            tracing::error!(error = %err, "pouch failed to initialize");
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Start { minutes } => commands::start(&context, minutes),
        Commands::Pause { id } => commands::pause(&context, id.map(SessionId::from)),
        Commands::Resume { id } => commands::resume(&context, id.map(SessionId::from)),
        Commands::Stop { id } => commands::stop(&context, id.map(SessionId::from)),
        Commands::Status { id, json } => commands::status(&context, id.map(SessionId::from), json),
        Commands::Watch { id } => commands::watch(&context, id.map(SessionId::from)),
        Commands::Sweep => {
            // The sweep never fails outward; hosts only see new_data/no_data.
            commands::sweep(&context);
            Ok(())
        }
    };

    if let Err(err) = result {
        tracing::error!(error = %err, "pouch command failed");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
