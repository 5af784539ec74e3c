//! A reconciliation session: engine, store and window snapshot together.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use pumphist_core::{CycleReport, HistoryOptions, PumpHistory, TrimOutcome};
use pumphist_store::Store;
use pumphist_types::DeviceTimestamp;

use crate::batch::{BatchClock, BatchFile};

/// Change signals evaluated at the end of a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Signals {
    pub pump_suspended: bool,
    pub basal_profile_changed: bool,
    pub pump_clock_changed: bool,
    pub relevant_config_changed: bool,
}

/// Result of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub source: String,
    pub added: usize,
    pub init: bool,
    pub report: CycleReport,
    pub signals: Signals,
    pub trimmed: usize,
    pub window_size: usize,
    pub latest_entry: Option<DeviceTimestamp>,
}

pub struct Session {
    store: Store,
    history: PumpHistory,
    init_remaining: u32,
}

impl Session {
    /// Open the store at `db` and resume its saved window.
    pub fn open(db: &Path, options: HistoryOptions, init_cycles: u32) -> Result<Self> {
        let store = Store::open(db)
            .with_context(|| format!("Failed to open database: {}", db.display()))?;
        Self::with_store(store, options, init_cycles)
    }

    pub fn with_store(store: Store, options: HistoryOptions, init_cycles: u32) -> Result<Self> {
        let window = store
            .load_window()
            .context("Failed to load history window")?;
        info!("Resuming with {} window entries", window.len());
        Ok(Self {
            store,
            history: PumpHistory::with_window(options, window),
            init_remaining: init_cycles,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run one full cycle over `batch` and save the window.
    pub fn run_batch(&mut self, source: &str, batch: BatchFile) -> Result<CycleSummary> {
        let init = self.init_remaining > 0;
        self.history.set_in_init(init);

        let mut clock = BatchClock::new(batch.clock_offset());
        let added = self.history.add_batch(batch.entries);
        debug!("Cycle for {} [added={}, init={}]", source, added, init);

        let report = self
            .history
            .process(&mut self.store, &mut clock)
            .with_context(|| format!("Failed to reconcile {}", source))?;

        let signals = Signals {
            pump_suspended: self.history.pump_is_suspended(),
            basal_profile_changed: self.history.basal_profile_changed(),
            pump_clock_changed: self.history.pump_clock_changed(),
            relevant_config_changed: self.history.relevant_config_changed(),
        };

        let trimmed = match self.history.finalize(&mut self.store)? {
            TrimOutcome::Trimmed { removed, .. } => removed,
            _ => 0,
        };
        self.store
            .save_window(self.history.window())
            .context("Failed to save history window")?;

        self.init_remaining = self.init_remaining.saturating_sub(1);

        Ok(CycleSummary {
            source: source.to_string(),
            added,
            init,
            report,
            signals,
            trimmed,
            window_size: self.history.window().len(),
            latest_entry: self.history.window().latest_timestamp(),
        })
    }

    /// Load and run a batch file.
    pub fn run_file(&mut self, path: &Path) -> Result<CycleSummary> {
        let batch = BatchFile::load(path)?;
        self.run_batch(&path.display().to_string(), batch)
    }
}
