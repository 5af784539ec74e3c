//! Main store implementation.

use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, info};

use pumphist_core::{HistoryWindow, StatisticsSink, TherapyStore};
use pumphist_types::{
    BolusRecord, DailyTotalRecord, DeviceTimestamp, ExtendedBolusRecord, RecordSource,
    TempRateRecord, TherapyRecord,
};

use crate::error::{Error, Result};
use crate::queries::RecordQuery;
use crate::schema;

/// Statistics key holding the newest reconciled entry timestamp.
pub const LAST_HISTORY_ENTRY_KEY: &str = "last_pump_history_entry";

/// Number of stored records per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub boluses: u64,
    pub extended_boluses: u64,
    pub temp_rates: u64,
    pub daily_totals: u64,
}

/// SQLite-based store for reconciled therapy records.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

/// Wall-clock seconds of a local date-time.
pub(crate) fn local_seconds(time: PrimitiveDateTime) -> i64 {
    time.assume_utc().unix_timestamp()
}

pub(crate) fn julian_day(day: Date) -> i32 {
    day.to_julian_day()
}

fn local_time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<PrimitiveDateTime> {
    let secs: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(secs)
        .map(|t| PrimitiveDateTime::new(t.date(), t.time()))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn day_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Date> {
    let day: i32 = row.get(idx)?;
    Date::from_julian_day(day)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn pump_id_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)? as u64)
}

fn source_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<RecordSource> {
    Ok(RecordSource::parse(&row.get::<_, String>(idx)?))
}

fn bolus_from_row(row: &Row<'_>) -> rusqlite::Result<BolusRecord> {
    Ok(BolusRecord {
        id: row.get(0)?,
        local_time: local_time_at(row, 1)?,
        source: source_at(row, 2)?,
        pump_id: pump_id_at(row, 3)?,
        insulin: row.get(4)?,
        carbs: row.get(5)?,
    })
}

fn extended_bolus_from_row(row: &Row<'_>) -> rusqlite::Result<ExtendedBolusRecord> {
    Ok(ExtendedBolusRecord {
        id: row.get(0)?,
        local_time: local_time_at(row, 1)?,
        source: source_at(row, 2)?,
        pump_id: pump_id_at(row, 3)?,
        insulin: row.get(4)?,
        duration_minutes: row.get(5)?,
    })
}

fn temp_rate_from_row(row: &Row<'_>) -> rusqlite::Result<TempRateRecord> {
    Ok(TempRateRecord {
        id: row.get(0)?,
        local_time: local_time_at(row, 1)?,
        source: source_at(row, 2)?,
        pump_id: pump_id_at(row, 3)?,
        rate: row.get(4)?,
        duration_minutes: row.get(5)?,
        is_absolute: row.get(6)?,
    })
}

fn daily_total_from_row(row: &Row<'_>) -> rusqlite::Result<DailyTotalRecord> {
    Ok(DailyTotalRecord {
        id: row.get(0)?,
        day: day_at(row, 1)?,
        total_insulin: row.get(2)?,
        basal_insulin: row.get(3)?,
        bolus_insulin: row.get(4)?,
    })
}

const BOLUS_COLUMNS: &str = "id, local_time, source, pump_id, insulin, carbs";
const EXTENDED_BOLUS_COLUMNS: &str = "id, local_time, source, pump_id, insulin, duration_minutes";
const TEMP_RATE_COLUMNS: &str =
    "id, local_time, source, pump_id, rate, duration_minutes, is_absolute";
const DAILY_TOTAL_COLUMNS: &str = "id, day, total_insulin, basal_insulin, bolus_insulin";

// Record queries
impl Store {
    fn query_records<T>(
        &self,
        sql: String,
        params: Vec<i64>,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        debug!("Executing query: {}", sql);
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(rusqlite::params_from_iter(params), map)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn query_timed<T>(
        &self,
        table: &str,
        columns: &str,
        query: &RecordQuery,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let (where_clause, params) = query.build_where_time();
        let sql = format!(
            "SELECT {} FROM {} {} {}",
            columns,
            table,
            where_clause,
            query.build_suffix("local_time")
        );
        self.query_records(sql, params, map)
    }

    /// Query boluses.
    pub fn query_boluses(&self, query: &RecordQuery) -> Result<Vec<BolusRecord>> {
        self.query_timed("boluses", BOLUS_COLUMNS, query, bolus_from_row)
    }

    /// Query extended boluses.
    pub fn query_extended_boluses(&self, query: &RecordQuery) -> Result<Vec<ExtendedBolusRecord>> {
        self.query_timed(
            "extended_boluses",
            EXTENDED_BOLUS_COLUMNS,
            query,
            extended_bolus_from_row,
        )
    }

    /// Query temporary rates, including pump stops.
    pub fn query_temp_rates(&self, query: &RecordQuery) -> Result<Vec<TempRateRecord>> {
        self.query_timed("temp_rates", TEMP_RATE_COLUMNS, query, temp_rate_from_row)
    }

    /// Query daily totals. Time bounds apply to the day.
    pub fn query_daily_totals(&self, query: &RecordQuery) -> Result<Vec<DailyTotalRecord>> {
        let (where_clause, params) = query.build_where_day();
        let sql = format!(
            "SELECT {} FROM daily_totals {} {}",
            DAILY_TOTAL_COLUMNS,
            where_clause,
            query.build_suffix("day")
        );
        self.query_records(sql, params, daily_total_from_row)
    }

    /// Count records in every table.
    pub fn count_records(&self) -> Result<RecordCounts> {
        let count = |table: &str| -> Result<u64> {
            let n: i64 = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", table),
                [],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        };

        Ok(RecordCounts {
            boluses: count("boluses")?,
            extended_boluses: count("extended_boluses")?,
            temp_rates: count("temp_rates")?,
            daily_totals: count("daily_totals")?,
        })
    }

    /// Temporary rate created for a pump id, if any.
    pub fn temp_rate_by_pump_id(&self, pump_id: u64) -> Result<Option<TempRateRecord>> {
        if pump_id == 0 {
            return Ok(None);
        }
        let sql = format!(
            "SELECT {} FROM temp_rates WHERE pump_id = ? ORDER BY id LIMIT 1",
            TEMP_RATE_COLUMNS
        );
        let record = self
            .conn
            .query_row(&sql, [pump_id as i64], temp_rate_from_row)
            .optional()?;
        Ok(record)
    }
}

// Record writes
impl Store {
    /// Row a record resolves to: by row id, else by non-zero pump id.
    fn resolve_row(&self, table: &str, id: i64, pump_id: u64) -> Result<Option<i64>> {
        if id != 0 {
            let found = self
                .conn
                .query_row(&format!("SELECT id FROM {} WHERE id = ?", table), [id], |row| {
                    row.get(0)
                })
                .optional()?;
            if found.is_some() {
                return Ok(found);
            }
        }

        if pump_id != 0 {
            let found = self
                .conn
                .query_row(
                    &format!("SELECT id FROM {} WHERE pump_id = ? ORDER BY id LIMIT 1", table),
                    [pump_id as i64],
                    |row| row.get(0),
                )
                .optional()?;
            return Ok(found);
        }

        Ok(None)
    }

    fn write_bolus(&self, r: &BolusRecord) -> Result<bool> {
        let time = local_seconds(r.local_time);
        let pump_id = r.pump_id as i64;
        match self.resolve_row("boluses", r.id, r.pump_id)? {
            Some(row_id) => {
                self.conn.execute(
                    "UPDATE boluses SET local_time = ?1, source = ?2, pump_id = ?3,
                     insulin = ?4, carbs = ?5 WHERE id = ?6",
                    rusqlite::params![time, r.source.as_str(), pump_id, r.insulin, r.carbs, row_id],
                )?;
                Ok(false)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO boluses (local_time, source, pump_id, insulin, carbs)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![time, r.source.as_str(), pump_id, r.insulin, r.carbs],
                )?;
                Ok(true)
            }
        }
    }

    fn write_extended_bolus(&self, r: &ExtendedBolusRecord) -> Result<bool> {
        let time = local_seconds(r.local_time);
        let pump_id = r.pump_id as i64;
        match self.resolve_row("extended_boluses", r.id, r.pump_id)? {
            Some(row_id) => {
                self.conn.execute(
                    "UPDATE extended_boluses SET local_time = ?1, source = ?2, pump_id = ?3,
                     insulin = ?4, duration_minutes = ?5 WHERE id = ?6",
                    rusqlite::params![
                        time,
                        r.source.as_str(),
                        pump_id,
                        r.insulin,
                        r.duration_minutes,
                        row_id
                    ],
                )?;
                Ok(false)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO extended_boluses (local_time, source, pump_id, insulin, duration_minutes)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        time,
                        r.source.as_str(),
                        pump_id,
                        r.insulin,
                        r.duration_minutes
                    ],
                )?;
                Ok(true)
            }
        }
    }

    fn write_temp_rate(&self, r: &TempRateRecord) -> Result<bool> {
        let time = local_seconds(r.local_time);
        let pump_id = r.pump_id as i64;
        match self.resolve_row("temp_rates", r.id, r.pump_id)? {
            Some(row_id) => {
                self.conn.execute(
                    "UPDATE temp_rates SET local_time = ?1, source = ?2, pump_id = ?3,
                     rate = ?4, duration_minutes = ?5, is_absolute = ?6 WHERE id = ?7",
                    rusqlite::params![
                        time,
                        r.source.as_str(),
                        pump_id,
                        r.rate,
                        r.duration_minutes,
                        r.is_absolute,
                        row_id
                    ],
                )?;
                Ok(false)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO temp_rates (local_time, source, pump_id, rate, duration_minutes, is_absolute)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        time,
                        r.source.as_str(),
                        pump_id,
                        r.rate,
                        r.duration_minutes,
                        r.is_absolute
                    ],
                )?;
                Ok(true)
            }
        }
    }

    fn write_daily_total(&self, r: &DailyTotalRecord) -> Result<bool> {
        let day = julian_day(r.day);
        let exists = self
            .conn
            .query_row("SELECT id FROM daily_totals WHERE day = ?", [day], |row| {
                row.get::<_, i64>(0)
            })
            .optional()?
            .is_some();

        self.conn.execute(
            "INSERT INTO daily_totals (day, total_insulin, basal_insulin, bolus_insulin)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(day) DO UPDATE SET
                total_insulin = ?2,
                basal_insulin = ?3,
                bolus_insulin = ?4",
            rusqlite::params![day, r.total_insulin, r.basal_insulin, r.bolus_insulin],
        )?;

        Ok(!exists)
    }

    /// Insert or update a record. Returns `true` if a new row was created.
    pub fn upsert_record(&self, record: &TherapyRecord) -> Result<bool> {
        let created = match record {
            TherapyRecord::Bolus(r) => self.write_bolus(r)?,
            TherapyRecord::ExtendedBolus(r) => self.write_extended_bolus(r)?,
            TherapyRecord::TempRate(r) => self.write_temp_rate(r)?,
            TherapyRecord::DailyTotal(r) => self.write_daily_total(r)?,
        };
        debug!(
            "{} {:?} record [pumpId={}, time={}]",
            if created { "Inserted" } else { "Updated" },
            record.kind(),
            record.pump_id(),
            record.local_time()
        );
        Ok(created)
    }
}

// Statistics and window snapshot
impl Store {
    /// Set an integer statistic.
    pub fn set_statistic(&self, key: &str, value: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO statistics (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            rusqlite::params![key, value, OffsetDateTime::now_utc().unix_timestamp()],
        )?;
        Ok(())
    }

    /// Read an integer statistic.
    pub fn statistic(&self, key: &str) -> Result<Option<i64>> {
        let value = self
            .conn
            .query_row("SELECT value FROM statistics WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Newest reconciled history entry, as last reported by a cycle.
    pub fn last_history_entry(&self) -> Result<Option<DeviceTimestamp>> {
        match self.statistic(LAST_HISTORY_ENTRY_KEY)? {
            Some(raw) => u64::try_from(raw)
                .map(|raw| Some(DeviceTimestamp::from_raw(raw)))
                .map_err(|_| Error::InvalidTimestamp(raw.to_string())),
            None => Ok(None),
        }
    }

    /// Persist the history window.
    pub fn save_window(&self, window: &HistoryWindow) -> Result<()> {
        let json = serde_json::to_string(window)?;
        self.conn.execute(
            "INSERT INTO window_state (id, entries, saved_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET entries = ?1, saved_at = ?2",
            rusqlite::params![json, OffsetDateTime::now_utc().unix_timestamp()],
        )?;
        debug!("Saved history window with {} entries", window.len());
        Ok(())
    }

    /// Load the saved history window, or an empty one.
    pub fn load_window(&self) -> Result<HistoryWindow> {
        let json: Option<String> = self
            .conn
            .query_row("SELECT entries FROM window_state WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match json {
            Some(json) => {
                let window: HistoryWindow = serde_json::from_str(&json)?;
                debug!("Loaded history window with {} entries", window.len());
                Ok(window)
            }
            None => Ok(HistoryWindow::new()),
        }
    }
}

fn core_error(operation: &'static str) -> impl FnOnce(Error) -> pumphist_core::Error {
    move |e| pumphist_core::Error::store(operation, e)
}

impl TherapyStore for Store {
    fn temp_rates_since(&self, since: PrimitiveDateTime) -> pumphist_core::Result<Vec<TempRateRecord>> {
        self.query_temp_rates(&RecordQuery::new().since(since).oldest_first())
            .map_err(core_error("temp_rates_since"))
    }

    fn boluses_since(&self, since: PrimitiveDateTime) -> pumphist_core::Result<Vec<BolusRecord>> {
        self.query_boluses(&RecordQuery::new().since(since).oldest_first())
            .map_err(core_error("boluses_since"))
    }

    fn daily_totals_for_last_days(
        &self,
        days: u32,
        today: Date,
    ) -> pumphist_core::Result<Vec<DailyTotalRecord>> {
        let first = today.saturating_sub(Duration::days(i64::from(days.saturating_sub(1))));
        self.query_daily_totals(
            &RecordQuery::new()
                .since(first.midnight())
                .until(today.midnight())
                .oldest_first(),
        )
        .map_err(core_error("daily_totals_for_last_days"))
    }

    fn upsert(&mut self, record: &TherapyRecord) -> pumphist_core::Result<bool> {
        self.upsert_record(record).map_err(core_error("upsert"))
    }

    fn find_temp_rate_by_pump_id(&self, pump_id: u64) -> pumphist_core::Result<Option<TempRateRecord>> {
        self.temp_rate_by_pump_id(pump_id)
            .map_err(core_error("find_temp_rate_by_pump_id"))
    }
}

impl StatisticsSink for Store {
    fn record_latest_entry(&mut self, timestamp: DeviceTimestamp) -> pumphist_core::Result<()> {
        self.set_statistic(LAST_HISTORY_ENTRY_KEY, timestamp.raw() as i64)
            .map_err(core_error("record_latest_entry"))
    }
}
