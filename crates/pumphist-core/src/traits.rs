//! Trait abstractions for the engine's external collaborators.
//!
//! The engine never owns the therapy store, the clock or the statistics
//! sink. They are passed in as `&mut` handles for the duration of a single
//! call, which keeps every cycle free of hidden global state and lets tests
//! swap in the in-memory implementations from [`crate::mock`].

use time::{Date, PrimitiveDateTime};

use pumphist_types::{
    BolusRecord, ClockOffset, DailyTotalRecord, DeviceTimestamp, TempRateRecord, TherapyRecord,
};

use crate::error::Result;

/// Persistent store of therapy records.
///
/// # Example
///
/// ```ignore
/// use pumphist_core::{TherapyStore, Result};
///
/// fn count_recent<S: TherapyStore>(store: &S, since: time::PrimitiveDateTime) -> Result<usize> {
///     Ok(store.boluses_since(since)?.len())
/// }
/// ```
pub trait TherapyStore {
    /// Temporary rates with a local time at or after `since`.
    fn temp_rates_since(&self, since: PrimitiveDateTime) -> Result<Vec<TempRateRecord>>;

    /// Boluses with a local time at or after `since`.
    fn boluses_since(&self, since: PrimitiveDateTime) -> Result<Vec<BolusRecord>>;

    /// Daily totals for `today` and the `days - 1` days before it.
    fn daily_totals_for_last_days(&self, days: u32, today: Date) -> Result<Vec<DailyTotalRecord>>;

    /// Insert or update a record.
    ///
    /// Returns `true` if a new record was created.
    fn upsert(&mut self, record: &TherapyRecord) -> Result<bool>;

    /// Find the temporary rate created for a pump-assigned id.
    fn find_temp_rate_by_pump_id(&self, pump_id: u64) -> Result<Option<TempRateRecord>>;
}

/// Source of the pump-versus-local clock relation.
pub trait ClockSource {
    /// Read the current clock offset. Called once per reconciliation cycle.
    fn read_clock(&mut self) -> Result<ClockOffset>;
}

/// Receiver for per-cycle bookkeeping.
pub trait StatisticsSink {
    /// Called after each cycle with the newest reconciled entry time.
    fn record_latest_entry(&mut self, timestamp: DeviceTimestamp) -> Result<()>;
}
