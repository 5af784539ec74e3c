//! Time-based matching of new events against persisted records.
//!
//! A pump-sourced record may already exist for an event (written by an
//! earlier cycle, or entered manually), but its local time rarely equals
//! the localized event time exactly. The search widens the tolerance step by
//! step, from 10 seconds up to 4 minutes 50 seconds, and accepts the first
//! tolerance at which exactly one record is inside the window.

use time::{Duration, PrimitiveDateTime};
use tracing::{debug, warn};

use pumphist_types::{HistoryEntry, Timestamped};

use crate::clock::ClockCorrelator;

const MAX_MINUTES: i64 = 4;
const SECOND_STEPS: [i64; 6] = [0, 10, 20, 30, 40, 50];

/// Result of a correlation search.
#[derive(Debug)]
pub enum Correlation<'a, R> {
    /// A single record corresponds to the event.
    Match(&'a R),
    /// Several records are within the narrowest useful tolerance.
    Ambiguous,
    /// No record corresponds to the event.
    NoMatch,
}

impl<'a, R> Correlation<'a, R> {
    /// The matched record, if any.
    pub fn record(&self) -> Option<&'a R> {
        match self {
            Correlation::Match(r) => Some(r),
            _ => None,
        }
    }
}

/// Records strictly inside `(proposed - tolerance, proposed + tolerance)`.
pub fn matching_within<'a, R: Timestamped>(
    records: &'a [R],
    proposed: PrimitiveDateTime,
    tolerance: Duration,
) -> Vec<&'a R> {
    let lower = proposed.saturating_sub(tolerance);
    let upper = proposed.saturating_add(tolerance);
    records
        .iter()
        .filter(|r| {
            let t = r.local_time();
            lower < t && t < upper
        })
        .collect()
}

/// Finds the persisted record a new event corresponds to.
#[derive(Debug, Clone, Copy)]
pub struct Correlator {
    clock: ClockCorrelator,
}

impl Correlator {
    pub fn new(clock: ClockCorrelator) -> Self {
        Self { clock }
    }

    /// Search `records` for the record `entry` corresponds to.
    ///
    /// With a single candidate no time check is made. An entry whose
    /// timestamp cannot be decoded never matches.
    pub fn find_match<'a, R: Timestamped>(
        &self,
        entry: &HistoryEntry,
        records: &'a [R],
    ) -> Correlation<'a, R> {
        if records.is_empty() {
            return Correlation::NoMatch;
        }

        let Some(proposed) = self.clock.try_local_time(entry) else {
            return Correlation::NoMatch;
        };

        if let [only] = records {
            return Correlation::Match(only);
        }

        for minutes in 0..=MAX_MINUTES {
            for seconds in SECOND_STEPS {
                let tolerance = Duration::minutes(minutes) + Duration::seconds(seconds);
                let matching = matching_within(records, proposed, tolerance);

                if matching.len() == 1 {
                    debug!(
                        "Found match for {} [proposed={}, tolerance={}]",
                        entry, proposed, tolerance
                    );
                    return Correlation::Match(matching[0]);
                }

                if minutes == 0 && seconds == 10 && matching.len() > 1 {
                    warn!(
                        "Ambiguous match for {}: {} records within 10 seconds, treating as new",
                        entry,
                        matching.len()
                    );
                    return Correlation::Ambiguous;
                }
            }
        }

        debug!("No match for {} [proposed={}]", entry, proposed);
        Correlation::NoMatch
    }
}
