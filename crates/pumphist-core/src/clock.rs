//! Pump clock correlation.
//!
//! Pumps keep their own wall clock, which drifts and is set by hand. Every
//! entry timestamp is in pump time, while persisted records carry local
//! time. [`ClockCorrelator`] holds the offset measured for the current cycle
//! and performs the translation.

use time::{Duration, PrimitiveDateTime};
use tracing::{debug, error};

use pumphist_types::{ClockOffset, DeviceTimestamp, HistoryEntry};

use crate::error::Result;

/// Translates pump timestamps into local time for one cycle.
#[derive(Debug, Clone, Copy)]
pub struct ClockCorrelator {
    offset: ClockOffset,
}

impl ClockCorrelator {
    pub fn new(offset: ClockOffset) -> Self {
        Self { offset }
    }

    /// The snapshot this correlator was built from.
    pub fn offset(&self) -> ClockOffset {
        self.offset
    }

    /// Signed offset `local - pump`.
    pub fn offset_seconds(&self) -> i64 {
        self.offset.offset_seconds
    }

    /// Local "now" as measured when the offset was taken.
    pub fn local_now(&self) -> PrimitiveDateTime {
        self.offset.local_time
    }

    /// Translate a pump timestamp into local time.
    ///
    /// Fails only if the timestamp itself is malformed.
    pub fn to_local_time(&self, timestamp: DeviceTimestamp) -> Result<PrimitiveDateTime> {
        let pump_time = timestamp.to_datetime()?;
        let local = pump_time.saturating_add(Duration::seconds(self.offset.offset_seconds));

        debug!(
            "to_local_time: [entry={}, pumpClock={}, localClock={}, differenceSec={}, local={}]",
            timestamp,
            self.offset.pump_time.time(),
            self.offset.local_time.time(),
            self.offset.offset_seconds,
            local
        );

        Ok(local)
    }

    /// Local time of an entry, or `None` (logged) if its timestamp is malformed.
    pub fn try_local_time(&self, entry: &HistoryEntry) -> Option<PrimitiveDateTime> {
        match self.to_local_time(entry.timestamp) {
            Ok(local) => Some(local),
            Err(e) => {
                error!("Problem decoding date of {}: {}", entry, e);
                None
            }
        }
    }

    /// Lower bound for querying persisted records that may match `entries`.
    ///
    /// Takes the oldest decodable entry, backs off by `margin` and, when the
    /// pump clock is ahead of the local clock, by the offset as well. Entries
    /// with malformed timestamps are ignored. Falls back to
    /// `local_now - default_lookback` if no entry can be decoded.
    pub fn query_lower_bound(
        &self,
        entries: &[&HistoryEntry],
        margin: Duration,
        default_lookback: Duration,
    ) -> PrimitiveDateTime {
        let oldest = entries
            .iter()
            .filter_map(|e| match e.timestamp.to_datetime() {
                Ok(dt) => Some((e.timestamp, dt)),
                Err(err) => {
                    error!("Problem decoding date of {}, ignored for lookback: {}", e, err);
                    None
                }
            })
            .min_by_key(|(_, dt)| *dt);

        let Some((oldest, dt)) = oldest else {
            return self.local_now().saturating_sub(default_lookback);
        };

        let mut bound = dt.saturating_sub(margin);
        if self.offset.offset_seconds < 0 {
            bound = bound.saturating_add(Duration::seconds(self.offset.offset_seconds));
        }
        debug!(
            "Oldest entry: {}, pumpTimeDifference={}, lowerBound={}, currentTime={}",
            oldest,
            self.offset.offset_seconds,
            bound,
            self.local_now()
        );
        bound
    }
}
