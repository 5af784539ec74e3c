//! Status command: window and store at a glance.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde::Serialize;

use pumphist_core::{HistoryOptions, PumpHistory};
use pumphist_store::{RecordCounts, Store};
use pumphist_types::DeviceTimestamp;

use crate::cli::OutputFormat;
use crate::format::format_json;

/// Snapshot of the persisted state.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub database: PathBuf,
    pub window_size: usize,
    pub latest_entry: Option<DeviceTimestamp>,
    pub pump_suspended: bool,
    pub records: RecordCounts,
}

impl StatusReport {
    pub fn collect(store: &Store, database: &Path) -> Result<Self> {
        let window = store.load_window().context("Failed to load history window")?;
        let history = PumpHistory::with_window(HistoryOptions::default(), window);

        Ok(Self {
            database: database.to_path_buf(),
            window_size: history.window().len(),
            latest_entry: store.last_history_entry()?,
            pump_suspended: history.pump_is_suspended(),
            records: store.count_records()?,
        })
    }

    #[must_use]
    pub fn to_text(&self, no_color: bool) -> String {
        let latest = self
            .latest_entry
            .map_or_else(|| "none".to_string(), |t| t.to_string());
        let pump = match (self.pump_suspended, no_color) {
            (true, true) => "suspended".to_string(),
            (true, false) => "suspended".red().to_string(),
            (false, true) => "delivering".to_string(),
            (false, false) => "delivering".green().to_string(),
        };

        format!(
            "Database:      {}\n\
             Window:        {} entries\n\
             Latest entry:  {}\n\
             Pump:          {}\n\
             Records:       {} boluses, {} extended, {} temp rates, {} daily totals\n",
            self.database.display(),
            self.window_size,
            latest,
            pump,
            self.records.boluses,
            self.records.extended_boluses,
            self.records.temp_rates,
            self.records.daily_totals,
        )
    }
}

pub fn cmd_status(db: &Path, format: OutputFormat, no_color: bool) -> Result<()> {
    let store = Store::open(db)
        .with_context(|| format!("Failed to open database: {}", db.display()))?;
    let status = StatusReport::collect(&store, db)?;

    let content = match format {
        OutputFormat::Json => format_json(&status)?,
        OutputFormat::Text => status.to_text(no_color),
    };
    print!("{}", content);
    Ok(())
}
