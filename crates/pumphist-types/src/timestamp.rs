//! Packed pump timestamps.
//!
//! Pumps report the time of every history entry in their own local clock.
//! Upstream decoders hand it over as a packed decimal `yyyyMMddHHmmss`
//! value, so `20261016134502` is 2026-10-16 13:45:02 on the pump clock.
//!
//! Numeric ordering of packed values equals chronological ordering for all
//! valid values, which lets the engine sort and compare timestamps without
//! decoding them. Decoding can fail for corrupted entries; callers decide how
//! to recover.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month, PrimitiveDateTime, Time};

use crate::error::{ParseError, ParseResult};

/// A pump-local date-time packed as `yyyyMMddHHmmss`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct DeviceTimestamp(u64);

impl DeviceTimestamp {
    /// Wrap a packed value without validating it.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The packed value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Pack a date-time.
    ///
    /// ```
    /// use pumphist_types::DeviceTimestamp;
    /// use time::macros::datetime;
    ///
    /// let ts = DeviceTimestamp::from_datetime(datetime!(2026-10-16 13:45:02));
    /// assert_eq!(ts.raw(), 20261016134502);
    /// ```
    pub fn from_datetime(dt: PrimitiveDateTime) -> Self {
        let year = dt.year().max(0) as u64;
        let raw = year * 10_000_000_000
            + u64::from(u8::from(dt.month())) * 100_000_000
            + u64::from(dt.day()) * 1_000_000
            + u64::from(dt.hour()) * 10_000
            + u64::from(dt.minute()) * 100
            + u64::from(dt.second());
        Self(raw)
    }

    /// Decode into a date-time.
    ///
    /// Fails with [`ParseError::InvalidTimestamp`] if any field is out of range.
    pub fn to_datetime(self) -> ParseResult<PrimitiveDateTime> {
        let invalid = || ParseError::InvalidTimestamp(self.0);

        let raw = self.0;
        let second = (raw % 100) as u8;
        let minute = ((raw / 100) % 100) as u8;
        let hour = ((raw / 10_000) % 100) as u8;
        let day = ((raw / 1_000_000) % 100) as u8;
        let month = ((raw / 100_000_000) % 100) as u8;
        let year = i32::try_from(raw / 10_000_000_000).map_err(|_| invalid())?;

        let month = Month::try_from(month).map_err(|_| invalid())?;
        let date = Date::from_calendar_date(year, month, day).map_err(|_| invalid())?;
        let time = Time::from_hms(hour, minute, second).map_err(|_| invalid())?;

        Ok(PrimitiveDateTime::new(date, time))
    }

    /// Calendar date of this timestamp.
    pub fn date(self) -> ParseResult<Date> {
        self.to_datetime().map(|dt| dt.date())
    }

    /// Whether this timestamp falls on the given calendar day.
    ///
    /// Undecodable timestamps are never on any day.
    pub fn is_same_day(self, day: Date) -> bool {
        self.date().is_ok_and(|d| d == day)
    }

    /// Shift by a signed duration, re-packing the result.
    pub fn checked_add(self, duration: Duration) -> ParseResult<Self> {
        let dt = self.to_datetime()?;
        dt.checked_add(duration)
            .map(Self::from_datetime)
            .ok_or(ParseError::InvalidTimestamp(self.0))
    }

    /// Whole minutes from `self` to `later` (negative if `later` is earlier).
    pub fn minutes_until(self, later: Self) -> ParseResult<i64> {
        let start = self.to_datetime()?;
        let end = later.to_datetime()?;
        Ok((end - start).whole_minutes())
    }
}

impl From<PrimitiveDateTime> for DeviceTimestamp {
    fn from(dt: PrimitiveDateTime) -> Self {
        Self::from_datetime(dt)
    }
}

impl fmt::Display for DeviceTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Ok(dt) => write!(
                f,
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                dt.year(),
                u8::from(dt.month()),
                dt.day(),
                dt.hour(),
                dt.minute(),
                dt.second()
            ),
            Err(_) => write!(f, "<invalid {}>", self.0),
        }
    }
}
