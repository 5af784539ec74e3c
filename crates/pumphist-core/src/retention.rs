//! Retention policy for the history window.

use time::Duration;
use tracing::{error, info};

use pumphist_types::DeviceTimestamp;

use crate::window::HistoryWindow;

/// Outcome of a retention pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimOutcome {
    /// Entries at or before `cutoff` were removed.
    Trimmed { cutoff: DeviceTimestamp, removed: usize },
    /// The window is empty.
    Empty,
    /// No timestamp in the window could be decoded; nothing was removed.
    SkippedUnknownAnchor(DeviceTimestamp),
}

/// Drops window entries older than the newest entry minus `retention`.
#[derive(Debug, Clone, Copy)]
pub struct RetentionTrimmer {
    retention: Duration,
}

impl RetentionTrimmer {
    pub fn new(retention: Duration) -> Self {
        Self { retention }
    }

    /// Newest timestamp minus the retention period.
    ///
    /// `None` if the window holds no decodable timestamp.
    pub fn retention_cutoff(&self, window: &HistoryWindow) -> Option<DeviceTimestamp> {
        window
            .latest_timestamp()
            .and_then(|latest| latest.checked_add(-self.retention).ok())
    }

    /// Trim the window in place.
    ///
    /// The cutoff is anchored on the newest decodable timestamp. Trimming is
    /// skipped only when no entry in the window can be decoded.
    pub fn apply(&self, window: &mut HistoryWindow) -> TrimOutcome {
        let Some(latest) = window.latest_timestamp() else {
            return match window.latest_raw_timestamp() {
                Some(raw) => {
                    error!(
                        "Could not determine date of latest entry ({}), history window not trimmed",
                        raw
                    );
                    TrimOutcome::SkippedUnknownAnchor(raw)
                }
                None => TrimOutcome::Empty,
            };
        };

        match latest.checked_add(-self.retention) {
            Ok(cutoff) => {
                let removed = window.trim(cutoff);
                info!(
                    "History window [afterFilterCount={}, removedItemsCount={}]",
                    window.len(),
                    removed
                );
                TrimOutcome::Trimmed { cutoff, removed }
            }
            Err(e) => {
                error!(
                    "Could not determine date of latest entry ({}), history window not trimmed",
                    e
                );
                TrimOutcome::SkippedUnknownAnchor(latest)
            }
        }
    }
}

impl Default for RetentionTrimmer {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}
