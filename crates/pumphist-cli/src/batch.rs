//! Batch files: one pump fetch, as handed over by the upstream decoder.
//!
//! ```json
//! {
//!   "pump_time": "2026-10-16T12:00:00",
//!   "local_time": "2026-10-16T12:00:30",
//!   "entries": [
//!     { "entry_type": "Bolus", "timestamp": 20261016113000, "pump_id": 4,
//!       "payload": { "kind": "Bolus", "data": { ... } } }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use pumphist_core::ClockSource;
use pumphist_types::{ClockOffset, HistoryEntry};

time::serde::format_description!(
    wall_clock,
    PrimitiveDateTime,
    "[year]-[month]-[day]T[hour]:[minute]:[second]"
);

/// A fetched slice of pump history with the clock reading taken alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFile {
    /// Pump clock when the slice was fetched.
    #[serde(with = "wall_clock")]
    pub pump_time: PrimitiveDateTime,
    /// Local clock at the same instant.
    #[serde(with = "wall_clock")]
    pub local_time: PrimitiveDateTime,
    #[serde(default)]
    pub entries: Vec<HistoryEntry>,
}

impl BatchFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read batch file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid batch file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn clock_offset(&self) -> ClockOffset {
        ClockOffset::between(self.pump_time, self.local_time)
    }
}

/// Clock source replaying the reading stored in a batch file.
#[derive(Debug, Clone, Copy)]
pub struct BatchClock {
    offset: ClockOffset,
}

impl BatchClock {
    pub fn new(offset: ClockOffset) -> Self {
        Self { offset }
    }
}

impl ClockSource for BatchClock {
    fn read_clock(&mut self) -> pumphist_core::Result<ClockOffset> {
        Ok(self.offset)
    }
}
