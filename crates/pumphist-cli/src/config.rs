//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use pumphist_core::HistoryOptions;
use pumphist_types::PumpModel;

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Database file; the platform data directory if unset
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Connected pump model (e.g. "722"), selects the daily totals entry
    #[serde(default)]
    pub pump_model: Option<String>,

    /// Directory watched for batch files
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,

    /// Watch polling interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Number of cycles after startup treated as the initial sync
    #[serde(default = "default_init_cycles")]
    pub init_cycles: u32,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_init_cycles() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: None,
            pump_model: None,
            spool_dir: None,
            poll_interval: default_poll_interval(),
            init_cycles: default_init_cycles(),
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pumphist")
            .join("config.toml")
    }

    /// Load config from the default file, or return default if not found
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`, or return default if missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => warn!("Failed to parse config {}: {}", path.display(), e),
                },
                Err(e) => warn!("Failed to read config {}: {}", path.display(), e),
            }
        }
        Self::default()
    }

    /// Save config to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Database path: explicit flag or `PUMPHIST_DB`, then config, then default.
    pub fn database_path(&self, explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| self.database.clone())
            .unwrap_or_else(pumphist_store::default_db_path)
    }

    /// Spool directory: explicit flag, then config, then default.
    pub fn spool_path(&self, explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| self.spool_dir.clone())
            .unwrap_or_else(|| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("pumphist")
                    .join("spool")
            })
    }

    pub fn model(&self) -> PumpModel {
        self.pump_model
            .as_deref()
            .map_or(PumpModel::Unknown, PumpModel::from_name)
    }

    /// Engine options derived from this config.
    pub fn history_options(&self) -> Result<HistoryOptions> {
        let options = HistoryOptions::new().pump_model(self.model());
        options.validate().context("Invalid history options")?;
        Ok(options)
    }
}
