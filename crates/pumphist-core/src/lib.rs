//! Reconciliation engine for insulin pump history.
//!
//! Pumps are polled periodically and return overlapping slices of their
//! history. This crate turns those slices into a deduplicated set of therapy
//! records without losing or double-counting a dose.
//!
//! # Features
//!
//! - **Deduplication**: a rolling 24 hour window recognises re-delivered entries
//! - **Pairing**: split temporary basals and pump stops are reassembled,
//!   including pairs cut in half by a fetch boundary
//! - **Clock drift**: pump timestamps are translated to local time with the
//!   offset measured in each cycle
//! - **Correlation**: new events are matched to existing records within an
//!   expanding tolerance, deciding between update and insert
//! - **Change detection**: basal profile, clock and settings changes
//!
//! # Pipeline
//!
//! | Stage | Type |
//! |-------|------|
//! | Dedup and classify | [`BatchFilter`] |
//! | Temp basal and pump-stop pairing | [`pairing`] |
//! | Insert or update decision | [`Correlator`], [`Reconciler`] |
//! | Window retention | [`RetentionTrimmer`] |
//! | Whole cycle | [`PumpHistory`] |
//!
//! The store, the pump clock and the statistics sink are external; see
//! [`TherapyStore`], [`ClockSource`] and [`StatisticsSink`]. The [`mock`]
//! module has in-memory versions of all three.

pub mod clock;
pub mod correlate;
pub mod error;
pub mod filter;
pub mod history;
pub mod mock;
pub mod options;
pub mod pairing;
pub mod reconcile;
pub mod retention;
pub mod signals;
pub mod traits;
pub mod window;

pub use clock::ClockCorrelator;
pub use correlate::{Correlation, Correlator, matching_within};
pub use error::{Error, Result};
pub use filter::BatchFilter;
pub use history::PumpHistory;
pub use options::HistoryOptions;
pub use pairing::{IntervalOperation, PumpStopInterval};
pub use reconcile::{CategoryReport, CycleReport, EntryLink, Reconciler};
pub use retention::{RetentionTrimmer, TrimOutcome};
pub use traits::{ClockSource, StatisticsSink, TherapyStore};
pub use window::HistoryWindow;

// Re-export types for convenience
pub use pumphist_types::{
    ClockOffset, DeviceTimestamp, EntryType, HistoryEntry, Payload, PumpModel, TherapyRecord,
};
