//! Therapy records as kept by the persistent store.
//!
//! Records are owned by the store. The engine reads them to correlate new
//! history entries and hands back new or updated copies for upsert; it never
//! deletes them. A record `id` of `0` means the record has not been stored yet.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{Date, PrimitiveDateTime};

/// Where a record originated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RecordSource {
    /// Reconstructed from pump history.
    Pump,
    /// Entered by the user or another app.
    User,
    #[default]
    Unknown,
}

impl RecordSource {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordSource::Pump => "pump",
            RecordSource::User => "user",
            RecordSource::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pump" => RecordSource::Pump,
            "user" => RecordSource::User,
            _ => RecordSource::Unknown,
        }
    }
}

/// An instantaneous bolus.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BolusRecord {
    pub id: i64,
    pub local_time: PrimitiveDateTime,
    pub source: RecordSource,
    /// Pump-assigned id, `0` if not pump-sourced.
    pub pump_id: u64,
    /// Units delivered.
    pub insulin: f64,
    /// Grams of carbohydrate, `0` if none were announced.
    pub carbs: f64,
}

/// A bolus delivered over a duration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExtendedBolusRecord {
    pub id: i64,
    pub local_time: PrimitiveDateTime,
    pub source: RecordSource,
    pub pump_id: u64,
    pub insulin: f64,
    pub duration_minutes: u32,
}

/// A temporary basal rate, including zero-rate pump stops.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TempRateRecord {
    pub id: i64,
    pub local_time: PrimitiveDateTime,
    pub source: RecordSource,
    pub pump_id: u64,
    /// U/h when `is_absolute`, percent of the scheduled basal otherwise.
    pub rate: f64,
    pub duration_minutes: u32,
    pub is_absolute: bool,
}

/// Insulin totals of one calendar day.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DailyTotalRecord {
    pub id: i64,
    pub day: Date,
    pub total_insulin: f64,
    pub basal_insulin: f64,
    pub bolus_insulin: f64,
}

/// Any record the engine can ask the store to upsert.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TherapyRecord {
    Bolus(BolusRecord),
    ExtendedBolus(ExtendedBolusRecord),
    TempRate(TempRateRecord),
    DailyTotal(DailyTotalRecord),
}

impl TherapyRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            TherapyRecord::Bolus(_) => RecordKind::Bolus,
            TherapyRecord::ExtendedBolus(_) => RecordKind::ExtendedBolus,
            TherapyRecord::TempRate(_) => RecordKind::TempRate,
            TherapyRecord::DailyTotal(_) => RecordKind::DailyTotal,
        }
    }

    pub fn pump_id(&self) -> u64 {
        match self {
            TherapyRecord::Bolus(r) => r.pump_id,
            TherapyRecord::ExtendedBolus(r) => r.pump_id,
            TherapyRecord::TempRate(r) => r.pump_id,
            TherapyRecord::DailyTotal(_) => 0,
        }
    }

    /// Local time of the record; midnight for daily totals.
    pub fn local_time(&self) -> PrimitiveDateTime {
        match self {
            TherapyRecord::Bolus(r) => r.local_time,
            TherapyRecord::ExtendedBolus(r) => r.local_time,
            TherapyRecord::TempRate(r) => r.local_time,
            TherapyRecord::DailyTotal(r) => r.day.midnight(),
        }
    }

    /// Non-owning reference to this record.
    pub fn link(&self) -> RecordLink {
        RecordLink {
            kind: self.kind(),
            pump_id: self.pump_id(),
            local_time: self.local_time(),
        }
    }
}

/// Record type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RecordKind {
    Bolus,
    ExtendedBolus,
    TempRate,
    DailyTotal,
}

/// Back-reference from a history entry to the record it was reconciled into.
///
/// Only used for logging and debugging; the store remains the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RecordLink {
    pub kind: RecordKind,
    pub pump_id: u64,
    pub local_time: PrimitiveDateTime,
}

/// Records that can be correlated by time.
pub trait Timestamped {
    /// Store row id.
    fn id(&self) -> i64;

    /// Local time of the record.
    fn local_time(&self) -> PrimitiveDateTime;

    /// Pump-assigned id, `0` if not pump-sourced.
    fn pump_id(&self) -> u64;
}

impl Timestamped for BolusRecord {
    fn id(&self) -> i64 {
        self.id
    }

    fn local_time(&self) -> PrimitiveDateTime {
        self.local_time
    }

    fn pump_id(&self) -> u64 {
        self.pump_id
    }
}

impl Timestamped for TempRateRecord {
    fn id(&self) -> i64 {
        self.id
    }

    fn local_time(&self) -> PrimitiveDateTime {
        self.local_time
    }

    fn pump_id(&self) -> u64 {
        self.pump_id
    }
}

impl Timestamped for ExtendedBolusRecord {
    fn id(&self) -> i64 {
        self.id
    }

    fn local_time(&self) -> PrimitiveDateTime {
        self.local_time
    }

    fn pump_id(&self) -> u64 {
        self.pump_id
    }
}
