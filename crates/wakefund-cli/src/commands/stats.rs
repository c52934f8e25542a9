//! Donation statistics commands.

use clap::Subcommand;

use crate::wiring::{self, CliResult};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Print donation aggregates
    Show,
    /// Print the full snooze transaction log
    Log,
    /// Reset aggregates to zero (the transaction log is kept)
    Reset,
}

pub fn run(action: StatsAction) -> CliResult {
    let service = wiring::service()?;
    match action {
        StatsAction::Show => {
            println!("{}", serde_json::to_string_pretty(&service.stats())?);
        }
        StatsAction::Log => {
            println!("{}", serde_json::to_string_pretty(&service.records())?);
        }
        StatsAction::Reset => {
            service.reset_statistics();
            println!("statistics reset (transaction log kept)");
        }
    }
    Ok(())
}
