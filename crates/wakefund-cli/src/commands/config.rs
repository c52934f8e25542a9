//! Configuration commands.

use clap::Subcommand;

use wakefund_core::Config;

use crate::wiring::CliResult;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write the current configuration (creating the file with defaults
    /// if it does not exist yet)
    Init,
}

pub fn run(action: ConfigAction) -> CliResult {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Init => {
            let config = Config::load()?;
            config.validate()?;
            config.save()?;
            println!("configuration written");
        }
    }
    Ok(())
}
