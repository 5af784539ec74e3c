//! Core types for decoded pump history.

use core::fmt;

use bytes::Bytes;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use crate::records::RecordLink;
use crate::timestamp::DeviceTimestamp;

/// Kind of a decoded pump history entry.
///
/// `TempBasalCombined` is never produced by the pump itself; it is derived by
/// merging a `TempBasalRate` entry with its `TempBasalDuration` partner.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new entry types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum EntryType {
    Bolus,
    BolusWizardEstimate,
    TempBasalRate,
    TempBasalDuration,
    TempBasalCombined,
    Suspend,
    Resume,
    Prime,
    Rewind,
    NoDeliveryAlarm,
    EndResultTotals,
    DailyTotals515,
    DailyTotals522,
    DailyTotals523,
    BasalProfileStart,
    ChangeBasalProfileOldProfile,
    ChangeBasalProfileNewProfile,
    NewTimeSet,
    ChangeTime,
    ChangeBasalPattern,
    ClearSettings,
    SaveSettings,
    ChangeMaxBolus,
    ChangeMaxBasal,
    ChangeTempBasalType,
    BatteryChange,
    LowBattery,
    LowReservoir,
    /// An opcode the decoder could not name. Passed through untouched.
    Unknown(u8),
}

impl EntryType {
    /// Whether this is one half of a split temporary basal.
    pub fn is_temp_basal_part(self) -> bool {
        matches!(self, EntryType::TempBasalRate | EntryType::TempBasalDuration)
    }

    /// Whether this entry type carries a day's insulin totals.
    pub fn is_daily_totals(self) -> bool {
        matches!(
            self,
            EntryType::EndResultTotals
                | EntryType::DailyTotals515
                | EntryType::DailyTotals522
                | EntryType::DailyTotals523
        )
    }

    /// Whether this entry type signals the pump resumed normal delivery.
    pub fn is_delivery(self) -> bool {
        matches!(self, EntryType::Bolus | EntryType::TempBasalCombined)
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::Unknown(code) => write!(f, "Unknown(0x{:02X})", code),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Medtronic pump model, as far as history handling cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum PumpModel {
    Mm515,
    Mm715,
    Mm522,
    Mm722,
    Mm523,
    Mm723,
    Mm554,
    Mm754,
    #[default]
    Unknown,
}

impl PumpModel {
    /// The history entry type this model uses for its daily insulin totals.
    ///
    /// ```
    /// use pumphist_types::{EntryType, PumpModel};
    ///
    /// assert_eq!(PumpModel::Mm722.daily_totals_type(), EntryType::DailyTotals522);
    /// assert_eq!(PumpModel::Unknown.daily_totals_type(), EntryType::EndResultTotals);
    /// ```
    pub fn daily_totals_type(self) -> EntryType {
        match self {
            PumpModel::Mm515 | PumpModel::Mm715 => EntryType::DailyTotals515,
            PumpModel::Mm522 | PumpModel::Mm722 => EntryType::DailyTotals522,
            PumpModel::Mm523 | PumpModel::Mm723 | PumpModel::Mm554 | PumpModel::Mm754 => {
                EntryType::DailyTotals523
            }
            PumpModel::Unknown => EntryType::EndResultTotals,
        }
    }

    /// Parse a model from its number (`"522"`, `"MM722"`, `"754"`).
    pub fn from_name(name: &str) -> Self {
        let digits: String = name.chars().filter(char::is_ascii_digit).collect();
        match digits.as_str() {
            "515" => PumpModel::Mm515,
            "715" => PumpModel::Mm715,
            "522" => PumpModel::Mm522,
            "722" => PumpModel::Mm722,
            "523" => PumpModel::Mm523,
            "723" => PumpModel::Mm723,
            "554" => PumpModel::Mm554,
            "754" => PumpModel::Mm754,
            _ => PumpModel::Unknown,
        }
    }
}

/// How a bolus was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BolusType {
    /// Delivered at once.
    Normal,
    /// Delivered via the pump's audio (easy) bolus button.
    Audio,
    /// Spread over a duration (square/dual wave).
    Extended,
}

/// Decoded bolus entry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BolusDto {
    pub bolus_type: BolusType,
    /// Requested units.
    pub requested_amount: f64,
    /// Units actually delivered.
    pub delivered_amount: f64,
    /// Units delivered immediately (dual wave).
    pub immediate_amount: f64,
    /// Duration in minutes for extended boluses, 0 otherwise.
    pub duration_minutes: u32,
}

impl BolusDto {
    /// A normal bolus that delivered `amount` units.
    pub fn normal(amount: f64) -> Self {
        Self {
            bolus_type: BolusType::Normal,
            requested_amount: amount,
            delivered_amount: amount,
            immediate_amount: amount,
            duration_minutes: 0,
        }
    }

    /// An extended bolus over `duration_minutes`.
    pub fn extended(amount: f64, duration_minutes: u32) -> Self {
        Self {
            bolus_type: BolusType::Extended,
            requested_amount: amount,
            delivered_amount: amount,
            immediate_amount: 0.0,
            duration_minutes,
        }
    }
}

/// Temporary basal rate and its duration.
///
/// The pump writes the two halves as separate entries. A `TempBasalRate`
/// entry carries the rate and percent flag with a zero duration, a
/// `TempBasalDuration` entry the duration with a zero rate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TempBasalPair {
    /// Units per hour, or percent of the scheduled basal when `is_percent`.
    pub insulin_rate: f64,
    pub duration_minutes: u32,
    pub is_percent: bool,
}

impl TempBasalPair {
    /// Absolute rate in U/h.
    pub fn absolute(insulin_rate: f64, duration_minutes: u32) -> Self {
        Self {
            insulin_rate,
            duration_minutes,
            is_percent: false,
        }
    }

    /// Merge the rate half with the duration half.
    pub fn combine(rate: &TempBasalPair, duration: &TempBasalPair) -> Self {
        Self {
            insulin_rate: rate.insulin_rate,
            duration_minutes: duration.duration_minutes,
            is_percent: rate.is_percent,
        }
    }

    /// A zero-duration temp basal cancels the running one.
    pub fn is_cancel(&self) -> bool {
        self.duration_minutes == 0
    }
}

/// One day's insulin totals as reported by the pump.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DailyTotalsDto {
    pub total_insulin: f64,
    pub basal_insulin: f64,
    pub bolus_insulin: f64,
}

/// One segment of a basal profile.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BasalRate {
    /// Minutes after midnight the segment starts.
    pub start_minutes: u16,
    /// Units per hour.
    pub rate: f64,
}

/// A basal profile: rate segments ordered by start time.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BasalProfile {
    pub rates: Vec<BasalRate>,
}

impl BasalProfile {
    /// The rate in effect at the start of each hour of the day.
    ///
    /// ```
    /// use pumphist_types::{BasalProfile, BasalRate};
    ///
    /// let profile = BasalProfile {
    ///     rates: vec![
    ///         BasalRate { start_minutes: 0, rate: 0.8 },
    ///         BasalRate { start_minutes: 6 * 60, rate: 1.1 },
    ///     ],
    /// };
    /// let hourly = profile.rates_by_hour();
    /// assert_eq!(hourly[5], 0.8);
    /// assert_eq!(hourly[6], 1.1);
    /// assert_eq!(hourly[23], 1.1);
    /// ```
    pub fn rates_by_hour(&self) -> [f64; 24] {
        let mut hourly = [0.0; 24];
        for (hour, slot) in hourly.iter_mut().enumerate() {
            let minute = (hour * 60) as u16;
            *slot = self
                .rates
                .iter()
                .filter(|r| r.start_minutes <= minute)
                .last()
                .map_or(0.0, |r| r.rate);
        }
        hourly
    }
}

/// Bolus wizard calculation that preceded a bolus.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BolusWizardDto {
    /// Grams of carbohydrate entered.
    pub carbs: f64,
    pub blood_glucose: f64,
    pub correction_estimate: f64,
    pub food_estimate: f64,
    pub bolus_estimate: f64,
}

/// Decoded payload of a history entry.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "data"))]
pub enum Payload {
    Bolus(BolusDto),
    TempBasal(TempBasalPair),
    DailyTotals(DailyTotalsDto),
    BasalProfile(BasalProfile),
    BolusWizard(BolusWizardDto),
    #[default]
    Empty,
}

impl Payload {
    pub fn as_bolus(&self) -> Option<&BolusDto> {
        match self {
            Payload::Bolus(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_temp_basal(&self) -> Option<&TempBasalPair> {
        match self {
            Payload::TempBasal(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_daily_totals(&self) -> Option<&DailyTotalsDto> {
        match self {
            Payload::DailyTotals(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_basal_profile(&self) -> Option<&BasalProfile> {
        match self {
            Payload::BasalProfile(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_bolus_wizard(&self) -> Option<&BolusWizardDto> {
        match self {
            Payload::BolusWizard(w) => Some(w),
            _ => None,
        }
    }
}

/// One decoded pump history record.
///
/// Two entries denote the same record iff [`HistoryEntry::same_record`]
/// holds: equal type, timestamp, pump id and payload. The wizard estimate
/// side-slot and the record link are annotations added during
/// reconciliation and do not take part in identity.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HistoryEntry {
    pub entry_type: EntryType,
    pub timestamp: DeviceTimestamp,
    /// Opaque key shared by entries written in the same pump operation
    /// (the undecoded date bytes).
    #[cfg_attr(feature = "serde", serde(default))]
    pub raw_token: Bytes,
    /// Stable id assigned by the decoder, `0` if the entry cannot be persisted.
    #[cfg_attr(feature = "serde", serde(default))]
    pub pump_id: u64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub payload: Payload,
    /// Wizard estimate recorded together with a bolus.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub estimate: Option<BolusWizardDto>,
    /// Record this entry was reconciled into.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub linked_record: Option<RecordLink>,
}

impl HistoryEntry {
    /// Create an entry with an empty payload.
    pub fn new(entry_type: EntryType, timestamp: DeviceTimestamp, pump_id: u64) -> Self {
        Self {
            entry_type,
            timestamp,
            raw_token: Bytes::copy_from_slice(&timestamp.raw().to_be_bytes()),
            pump_id,
            payload: Payload::Empty,
            estimate: None,
            linked_record: None,
        }
    }

    /// Set the payload.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Set the raw pairing token.
    pub fn with_raw_token(mut self, token: impl Into<Bytes>) -> Self {
        self.raw_token = token.into();
        self
    }

    /// Identity comparison used for deduplication.
    pub fn same_record(&self, other: &HistoryEntry) -> bool {
        self.entry_type == other.entry_type
            && self.timestamp == other.timestamp
            && self.pump_id == other.pump_id
            && self.payload == other.payload
    }

    /// Whether this entry is of any of the given types.
    pub fn is_any_of(&self, types: &[EntryType]) -> bool {
        types.contains(&self.entry_type)
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}, pumpId={}]",
            self.entry_type, self.timestamp, self.pump_id
        )
    }
}

/// Snapshot of the pump clock against the local clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClockOffset {
    /// Time shown by the pump when the snapshot was taken.
    pub pump_time: PrimitiveDateTime,
    /// Local wall-clock time at the same instant.
    pub local_time: PrimitiveDateTime,
    /// `local_time - pump_time` in whole seconds.
    pub offset_seconds: i64,
}

impl ClockOffset {
    /// Build a snapshot from simultaneous pump and local readings.
    pub fn between(pump_time: PrimitiveDateTime, local_time: PrimitiveDateTime) -> Self {
        Self {
            pump_time,
            local_time,
            offset_seconds: (local_time - pump_time).whole_seconds(),
        }
    }

    /// A snapshot where the pump clock agrees with the local clock.
    pub fn in_sync(now: PrimitiveDateTime) -> Self {
        Self::between(now, now)
    }
}
