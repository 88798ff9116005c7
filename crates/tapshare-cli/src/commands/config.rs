//! Config command implementation.

use anyhow::{Context, Result};

use tapshare_core::config::Config;

use super::{ConfigAction, ConfigArgs};

/// Run the config command.
pub fn run(args: ConfigArgs) -> Result<()> {
    match args.action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            let config = super::load_config();
            let content = config.to_toml().context("Failed to serialize config")?;
            println!("# {}", Config::config_path().display());
            println!();
            print!("{content}");
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
        }
        ConfigAction::Reset => {
            Config::default()
                .save()
                .context("Failed to write default config")?;
            println!("Configuration reset to defaults.");
            println!("  {}", Config::config_path().display());
        }
    }

    Ok(())
}
