//! In-memory collaborators for testing.
//!
//! This module provides implementations of [`TherapyStore`], [`ClockSource`]
//! and [`StatisticsSink`] that keep everything in memory, so the engine can be
//! exercised without a database or a pump.
//!
//! # Features
//!
//! - **Failure injection**: make the next store call or every clock read fail
//! - **Inspection**: read back stored records and count upserts
//!
//! # Example
//!
//! ```
//! use pumphist_core::mock::MockStore;
//! use pumphist_core::TherapyStore;
//! use pumphist_types::{BolusRecord, RecordSource};
//! use time::macros::datetime;
//!
//! let store = MockStore::new().with_bolus(BolusRecord {
//!     id: 0,
//!     local_time: datetime!(2026-10-16 10:00:00),
//!     source: RecordSource::User,
//!     pump_id: 0,
//!     insulin: 1.5,
//!     carbs: 20.0,
//! });
//! let found = store.boluses_since(datetime!(2026-10-16 09:00:00)).unwrap();
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].id, 1);
//! ```

use time::{Date, Duration, PrimitiveDateTime};

use pumphist_types::{
    BolusRecord, ClockOffset, DailyTotalRecord, DeviceTimestamp, ExtendedBolusRecord,
    TempRateRecord, TherapyRecord,
};

use crate::error::{Error, Result};
use crate::traits::{ClockSource, StatisticsSink, TherapyStore};

/// In-memory therapy store.
///
/// Upserts resolve like the SQLite store: by row id, else by non-zero pump
/// id, else a new row is created. Daily totals resolve by day.
#[derive(Debug, Default)]
pub struct MockStore {
    boluses: Vec<BolusRecord>,
    extended_boluses: Vec<ExtendedBolusRecord>,
    temp_rates: Vec<TempRateRecord>,
    daily_totals: Vec<DailyTotalRecord>,
    next_id: i64,
    upserts: Vec<TherapyRecord>,
    fail_message: Option<String>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a bolus. A zero id is replaced by the next free id.
    pub fn with_bolus(mut self, mut record: BolusRecord) -> Self {
        record.id = self.assign_id(record.id);
        self.boluses.push(record);
        self
    }

    /// Seed a temporary rate. A zero id is replaced by the next free id.
    pub fn with_temp_rate(mut self, mut record: TempRateRecord) -> Self {
        record.id = self.assign_id(record.id);
        self.temp_rates.push(record);
        self
    }

    /// Seed daily totals. A zero id is replaced by the next free id.
    pub fn with_daily_total(mut self, mut record: DailyTotalRecord) -> Self {
        record.id = self.assign_id(record.id);
        self.daily_totals.push(record);
        self
    }

    /// Make the next store call fail with `message`.
    pub fn fail_with(&mut self, message: &str) {
        self.fail_message = Some(message.to_string());
    }

    pub fn boluses(&self) -> &[BolusRecord] {
        &self.boluses
    }

    pub fn bolus(&self, id: i64) -> Option<&BolusRecord> {
        self.boluses.iter().find(|r| r.id == id)
    }

    pub fn extended_boluses(&self) -> &[ExtendedBolusRecord] {
        &self.extended_boluses
    }

    pub fn temp_rates(&self) -> &[TempRateRecord] {
        &self.temp_rates
    }

    pub fn daily_totals(&self) -> &[DailyTotalRecord] {
        &self.daily_totals
    }

    /// Every record passed to `upsert`, in call order.
    pub fn upserts(&self) -> &[TherapyRecord] {
        &self.upserts
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.len()
    }

    fn assign_id(&mut self, id: i64) -> i64 {
        if id != 0 {
            self.next_id = self.next_id.max(id);
            return id;
        }
        self.next_id += 1;
        self.next_id
    }

    fn check_failure(&self, operation: &'static str) -> Result<()> {
        match &self.fail_message {
            Some(message) => Err(Error::store(operation, message.clone())),
            None => Ok(()),
        }
    }

    fn take_failure(&mut self, operation: &'static str) -> Result<()> {
        match self.fail_message.take() {
            Some(message) => Err(Error::store(operation, message)),
            None => Ok(()),
        }
    }
}

/// Position of the row a record resolves to: by id, else by non-zero pump id.
fn resolve<R>(rows: &[R], id: i64, pump_id: u64, key: impl Fn(&R) -> (i64, u64)) -> Option<usize> {
    if id != 0 {
        return rows.iter().position(|r| key(r).0 == id);
    }
    if pump_id != 0 {
        return rows.iter().position(|r| key(r).1 == pump_id);
    }
    None
}

fn upsert_row<R: Clone>(
    rows: &mut Vec<R>,
    mut record: R,
    position: Option<usize>,
    next_id: &mut i64,
    set_id: impl Fn(&mut R, i64),
    id_of: impl Fn(&R) -> i64,
) -> bool {
    match position {
        Some(i) => {
            let id = id_of(&rows[i]);
            set_id(&mut record, id);
            rows[i] = record;
            false
        }
        None => {
            *next_id += 1;
            set_id(&mut record, *next_id);
            rows.push(record);
            true
        }
    }
}

impl TherapyStore for MockStore {
    fn temp_rates_since(&self, since: PrimitiveDateTime) -> Result<Vec<TempRateRecord>> {
        self.check_failure("temp_rates_since")?;
        Ok(self
            .temp_rates
            .iter()
            .filter(|r| r.local_time >= since)
            .cloned()
            .collect())
    }

    fn boluses_since(&self, since: PrimitiveDateTime) -> Result<Vec<BolusRecord>> {
        self.check_failure("boluses_since")?;
        Ok(self
            .boluses
            .iter()
            .filter(|r| r.local_time >= since)
            .cloned()
            .collect())
    }

    fn daily_totals_for_last_days(&self, days: u32, today: Date) -> Result<Vec<DailyTotalRecord>> {
        self.check_failure("daily_totals_for_last_days")?;
        let first = today.saturating_sub(Duration::days(i64::from(days.saturating_sub(1))));
        Ok(self
            .daily_totals
            .iter()
            .filter(|r| r.day >= first && r.day <= today)
            .cloned()
            .collect())
    }

    fn upsert(&mut self, record: &TherapyRecord) -> Result<bool> {
        self.take_failure("upsert")?;
        self.upserts.push(record.clone());

        let created = match record {
            TherapyRecord::Bolus(r) => {
                let pos = resolve(&self.boluses, r.id, r.pump_id, |x| (x.id, x.pump_id));
                upsert_row(
                    &mut self.boluses,
                    r.clone(),
                    pos,
                    &mut self.next_id,
                    |x, id| x.id = id,
                    |x| x.id,
                )
            }
            TherapyRecord::ExtendedBolus(r) => {
                let pos = resolve(&self.extended_boluses, r.id, r.pump_id, |x| (x.id, x.pump_id));
                upsert_row(
                    &mut self.extended_boluses,
                    r.clone(),
                    pos,
                    &mut self.next_id,
                    |x, id| x.id = id,
                    |x| x.id,
                )
            }
            TherapyRecord::TempRate(r) => {
                let pos = resolve(&self.temp_rates, r.id, r.pump_id, |x| (x.id, x.pump_id));
                upsert_row(
                    &mut self.temp_rates,
                    r.clone(),
                    pos,
                    &mut self.next_id,
                    |x, id| x.id = id,
                    |x| x.id,
                )
            }
            TherapyRecord::DailyTotal(r) => {
                let pos = self.daily_totals.iter().position(|x| x.day == r.day);
                upsert_row(
                    &mut self.daily_totals,
                    r.clone(),
                    pos,
                    &mut self.next_id,
                    |x, id| x.id = id,
                    |x| x.id,
                )
            }
        };

        Ok(created)
    }

    fn find_temp_rate_by_pump_id(&self, pump_id: u64) -> Result<Option<TempRateRecord>> {
        self.check_failure("find_temp_rate_by_pump_id")?;
        if pump_id == 0 {
            return Ok(None);
        }
        Ok(self
            .temp_rates
            .iter()
            .find(|r| r.pump_id == pump_id)
            .cloned())
    }
}

/// Clock source returning a fixed offset.
#[derive(Debug, Clone)]
pub struct FixedClock {
    offset: Option<ClockOffset>,
    fail_message: String,
    reads: u32,
}

impl FixedClock {
    pub fn new(offset: ClockOffset) -> Self {
        Self {
            offset: Some(offset),
            fail_message: String::new(),
            reads: 0,
        }
    }

    /// Pump and local clock agree at `now`.
    pub fn in_sync(now: PrimitiveDateTime) -> Self {
        Self::new(ClockOffset::in_sync(now))
    }

    /// A clock whose every read fails.
    pub fn failing(message: &str) -> Self {
        Self {
            offset: None,
            fail_message: message.to_string(),
            reads: 0,
        }
    }

    /// Replace the offset returned by subsequent reads.
    pub fn set_offset(&mut self, offset: ClockOffset) {
        self.offset = Some(offset);
    }

    /// Number of reads so far.
    pub fn reads(&self) -> u32 {
        self.reads
    }
}

impl ClockSource for FixedClock {
    fn read_clock(&mut self) -> Result<ClockOffset> {
        self.reads += 1;
        self.offset
            .ok_or_else(|| Error::clock(self.fail_message.clone()))
    }
}

/// Statistics sink remembering every reported timestamp.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    reported: Vec<DeviceTimestamp>,
}

impl RecordingSink {
    /// The most recently reported timestamp.
    pub fn latest(&self) -> Option<DeviceTimestamp> {
        self.reported.last().copied()
    }

    pub fn reported(&self) -> &[DeviceTimestamp] {
        &self.reported
    }
}

impl StatisticsSink for RecordingSink {
    fn record_latest_entry(&mut self, timestamp: DeviceTimestamp) -> Result<()> {
        self.reported.push(timestamp);
        Ok(())
    }
}
