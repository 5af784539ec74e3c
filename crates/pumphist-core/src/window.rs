//! Rolling window of known history entries.
//!
//! The window remembers every entry seen during roughly the last 24 hours so
//! that re-delivered entries are recognised and pairs split across fetch
//! cycles can be completed. Entries are kept in discovery order; identity
//! follows [`HistoryEntry::same_record`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use pumphist_types::{DeviceTimestamp, EntryType, HistoryEntry};

/// Identity-deduplicated buffer of history entries.
///
/// Not safe for concurrent mutation; callers run one cycle at a time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryWindow {
    entries: Vec<HistoryEntry>,
}

impl HistoryWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a window from previously saved entries, dropping duplicates.
    pub fn from_entries(entries: impl IntoIterator<Item = HistoryEntry>) -> Self {
        let mut window = Self::new();
        window.insert_all_new(entries);
        window
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Whether an identity-equal entry is already known.
    pub fn contains(&self, entry: &HistoryEntry) -> bool {
        self.entries.iter().any(|e| e.same_record(entry))
    }

    /// Add entries that are not yet known, preserving their order.
    ///
    /// Returns the number of entries added.
    pub fn insert_all_new(&mut self, entries: impl IntoIterator<Item = HistoryEntry>) -> usize {
        let mut added = 0;
        for entry in entries {
            if !self.contains(&entry) {
                self.entries.push(entry);
                added += 1;
            }
        }
        added
    }

    /// Remove entries at or before `cutoff`, and entries whose timestamp
    /// cannot be decoded. Returns the number of entries removed.
    pub fn trim(&mut self, cutoff: DeviceTimestamp) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| e.timestamp.to_datetime().is_ok() && e.timestamp > cutoff);
        let removed = before - self.entries.len();
        debug!(
            "Trimmed history window [cutoff={}, removed={}, remaining={}]",
            cutoff,
            removed,
            self.entries.len()
        );
        removed
    }

    /// Entries ordered by timestamp ascending; ties keep discovery order.
    pub fn sorted_view(&self) -> Vec<&HistoryEntry> {
        let mut view: Vec<&HistoryEntry> = self.entries.iter().collect();
        view.sort_by_key(|e| e.timestamp);
        view
    }

    /// Entries of the given types, newest first.
    pub fn newest_first_of(&self, types: &[EntryType]) -> Vec<&HistoryEntry> {
        let mut view: Vec<&HistoryEntry> = self
            .sorted_view()
            .into_iter()
            .filter(|e| e.is_any_of(types))
            .collect();
        view.reverse();
        view
    }

    /// Newest timestamp in the window that decodes to a date and time.
    pub fn latest_timestamp(&self) -> Option<DeviceTimestamp> {
        self.entries
            .iter()
            .map(|e| e.timestamp)
            .filter(|ts| ts.to_datetime().is_ok())
            .max()
    }

    /// Largest raw timestamp in the window, decodable or not.
    pub fn latest_raw_timestamp(&self) -> Option<DeviceTimestamp> {
        self.entries.iter().map(|e| e.timestamp).max()
    }
}
