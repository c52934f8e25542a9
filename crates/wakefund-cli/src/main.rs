//! Wakefund command-line interface.
//!
//! A thin shell over `wakefund_core::AlarmService`: every subcommand
//! builds the service against the on-disk sqlite store, runs one
//! operation, and prints the result. Charges are confirmed on stdin.

use clap::{Parser, Subcommand};
use uuid::Uuid;

mod commands;
mod wiring;

#[derive(Parser)]
#[command(
    name = "wakefund",
    version,
    about = "Alarm clock where snoozing costs an escalating donation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage alarms
    Alarm {
        #[command(subcommand)]
        action: commands::alarm::AlarmAction,
    },
    /// Snooze an alerting alarm (charges the next cost tier)
    Snooze {
        /// Alarm id
        id: Uuid,
    },
    /// Dismiss an alerting alarm
    Dismiss {
        /// Alarm id
        id: Uuid,
    },
    /// Donation statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Synchronize with another device through a shared snapshot file
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
    /// Configuration
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Alarm { action } => commands::alarm::run(action),
        Commands::Snooze { id } => commands::alarm::snooze(id),
        Commands::Dismiss { id } => commands::alarm::dismiss(id),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Sync { action } => commands::sync::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
