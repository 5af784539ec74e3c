//! Config command: inspect and initialize the config file.

use anyhow::Result;

use crate::cli::ConfigAction;
use crate::config::Config;

pub fn cmd_config(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", Config::path().display());
        }
        ConfigAction::Show => {
            let content = toml::to_string_pretty(config)?;
            if content.trim().is_empty() {
                println!("(empty configuration)");
            } else {
                print!("{}", content);
            }
        }
        ConfigAction::Init => {
            let path = Config::path();
            if path.exists() {
                println!("Config file already exists: {}", path.display());
            } else {
                Config::default().save()?;
                println!("Created config file: {}", path.display());
            }
        }
    }
    Ok(())
}
