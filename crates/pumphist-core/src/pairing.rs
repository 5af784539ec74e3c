//! Pairing of split history entries into logical events.
//!
//! The pump writes several logical events as more than one entry:
//!
//! - A temporary basal is a `TempBasalRate` entry plus a `TempBasalDuration`
//!   entry sharing the same raw date bytes.
//! - A delivery stop is a `Suspend` entry closed by a `Resume` entry.
//! - A reservoir change is a `Rewind` and one or more `Prime` entries,
//!   usually preceded by a `NoDeliveryAlarm`, and the stop lasts until the
//!   pump primed again.
//!
//! Fetch cycles may cut any of these pairs in half. Every function here is a
//! pure stage: it reads the new events and the retained window and returns a
//! new sequence without touching either input.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pumphist_types::{EntryType, HistoryEntry, ParseResult, Payload, TempBasalPair};

use crate::window::HistoryWindow;

/// What to do with a reconstructed pump-stop interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalOperation {
    /// Persist as a new zero-rate temporary basal.
    Create,
}

/// A period in which the pump delivered no insulin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpStopInterval {
    /// Entry that marks the start of the stop (`Suspend`, `NoDeliveryAlarm`
    /// or `Rewind`).
    pub start: HistoryEntry,
    /// Entry that marks delivery resuming (`Resume` or `Prime`).
    pub end: HistoryEntry,
    pub operation: IntervalOperation,
}

impl PumpStopInterval {
    pub fn new(start: HistoryEntry, end: HistoryEntry) -> Self {
        Self {
            start,
            end,
            operation: IntervalOperation::Create,
        }
    }

    /// Length of the stop in whole minutes.
    pub fn duration_minutes(&self) -> ParseResult<u32> {
        let minutes = self.start.timestamp.minutes_until(self.end.timestamp)?;
        Ok(u32::try_from(minutes.unsigned_abs()).unwrap_or(u32::MAX))
    }
}

fn pairing_key(entry: &HistoryEntry) -> Bytes {
    if entry.raw_token.is_empty() {
        Bytes::copy_from_slice(&entry.timestamp.raw().to_be_bytes())
    } else {
        entry.raw_token.clone()
    }
}

fn temp_basal_half(entry: &HistoryEntry) -> TempBasalPair {
    match entry.payload.as_temp_basal() {
        Some(pair) => pair.clone(),
        None => {
            warn!("Temp basal entry without temp basal payload: {}", entry);
            TempBasalPair::absolute(0.0, 0)
        }
    }
}

fn combine_temp_basal(rate: &HistoryEntry, duration: &HistoryEntry) -> HistoryEntry {
    let pair = TempBasalPair::combine(&temp_basal_half(rate), &temp_basal_half(duration));
    let mut combined = rate.clone();
    combined.entry_type = EntryType::TempBasalCombined;
    combined.payload = Payload::TempBasal(pair);
    combined
}

/// Merge `TempBasalRate`/`TempBasalDuration` halves into combined entries.
///
/// Halves are matched by raw token in a single pass. The combined entry takes
/// its timestamp, token and pump id from the rate half. Halves whose partner
/// is missing produce nothing; since raw halves never enter the window they
/// are offered again, and paired, once the partner has been fetched.
pub fn pair_temp_basals(parts: impl IntoIterator<Item = HistoryEntry>) -> Vec<HistoryEntry> {
    let mut held: HashMap<Bytes, HistoryEntry> = HashMap::new();
    let mut combined = Vec::new();

    for entry in parts {
        if !entry.entry_type.is_temp_basal_part() {
            continue;
        }

        let key = pairing_key(&entry);
        match held.remove(&key) {
            Some(partner) if partner.entry_type != entry.entry_type => {
                let (rate, duration) = if entry.entry_type == EntryType::TempBasalRate {
                    (&entry, &partner)
                } else {
                    (&partner, &entry)
                };
                combined.push(combine_temp_basal(rate, duration));
            }
            Some(_) | None => {
                held.insert(key, entry);
            }
        }
    }

    if !held.is_empty() {
        debug!(
            "Temp basal halves without partner (deferred): {}",
            held.len()
        );
    }

    combined
}

/// Make the Suspend/Resume entries of a batch pair up.
///
/// `newest_first` must hold only Suspend and Resume entries in reverse
/// chronological order. Depending on parity and the type of the newest entry,
/// the still-open newest Suspend is dropped and/or the oldest Resume is
/// closed with the nearest older Suspend from the window (or dropped when the
/// window has none). The result always has an even length.
pub fn normalize_suspend_resume(
    mut newest_first: Vec<HistoryEntry>,
    window: &HistoryWindow,
) -> Vec<HistoryEntry> {
    let Some(newest) = newest_first.first() else {
        return newest_first;
    };

    let even = newest_first.len() % 2 == 0;
    let starts_with_resume = newest.entry_type == EntryType::Resume;

    match (even, starts_with_resume) {
        (true, true) => {
            // R S R S: complete pairs
        }
        (true, false) => {
            // S R S R: open suspend on top, unpaired resume at the bottom
            newest_first.remove(0);
            close_oldest_with_window_suspend(&mut newest_first, window);
        }
        (false, true) => {
            // R S R: unpaired resume at the bottom
            close_oldest_with_window_suspend(&mut newest_first, window);
        }
        (false, false) => {
            // S R S: open suspend on top
            newest_first.remove(0);
        }
    }

    newest_first
}

fn close_oldest_with_window_suspend(newest_first: &mut Vec<HistoryEntry>, window: &HistoryWindow) {
    let Some(oldest) = newest_first.last().map(|e| e.timestamp) else {
        return;
    };

    let older_suspend = window
        .newest_first_of(&[EntryType::Suspend])
        .into_iter()
        .find(|s| s.timestamp < oldest)
        .cloned();

    match older_suspend {
        Some(suspend) => {
            debug!("Closing oldest resume with suspend from history: {}", suspend);
            newest_first.push(suspend);
        }
        None => {
            if let Some(dropped) = newest_first.pop() {
                debug!("No older suspend in history, dropping {}", dropped);
            }
        }
    }
}

/// Reconstruct pump-stop intervals from Suspend/Resume entries.
pub fn pair_suspend_resume(
    new_events: &[HistoryEntry],
    window: &HistoryWindow,
) -> Vec<PumpStopInterval> {
    let mut items: Vec<HistoryEntry> = new_events
        .iter()
        .filter(|e| e.is_any_of(&[EntryType::Suspend, EntryType::Resume]))
        .cloned()
        .collect();

    if items.is_empty() {
        return Vec::new();
    }

    items.sort_by_key(|e| e.timestamp);
    items.reverse();

    let mut paired = normalize_suspend_resume(items, window);
    paired.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    paired
        .chunks_exact(2)
        .filter_map(|pair| {
            let (newer, older) = (&pair[0], &pair[1]);
            if older.entry_type == EntryType::Suspend && newer.entry_type == EntryType::Resume {
                Some(PumpStopInterval::new(older.clone(), newer.clone()))
            } else {
                warn!(
                    "Suspend/resume entries out of sequence, skipping pair [{}, {}]",
                    older, newer
                );
                None
            }
        })
        .collect()
}

const PRIME_SCAN_TYPES: [EntryType; 5] = [
    EntryType::Prime,
    EntryType::Rewind,
    EntryType::NoDeliveryAlarm,
    EntryType::Bolus,
    EntryType::TempBasalCombined,
];

const PRIME_HISTORY_TYPES: [EntryType; 4] = [
    EntryType::Rewind,
    EntryType::NoDeliveryAlarm,
    EntryType::Bolus,
    EntryType::TempBasalCombined,
];

/// Reconstruct the stop around a reservoir change.
///
/// Scans backwards from the newest `Prime` until a bolus or temporary basal
/// shows when the pump last delivered, continuing into the window when the
/// batch does not reach that far. The stop ends at the `Prime`; it starts at
/// the first `NoDeliveryAlarm` of the stop if one was seen, otherwise at the
/// last `Rewind` before the `Prime`. Without a delivery entry the interval
/// stays incomplete and is retried in a later cycle.
pub fn pair_prime_stop(new_events: &[HistoryEntry], window: &HistoryWindow) -> Option<PumpStopInterval> {
    if !new_events.iter().any(|e| e.entry_type == EntryType::Prime) {
        return None;
    }

    let mut candidates: Vec<&HistoryEntry> = new_events
        .iter()
        .filter(|e| e.is_any_of(&PRIME_SCAN_TYPES))
        .collect();
    candidates.sort_by_key(|e| e.timestamp);
    candidates.reverse();

    let mut collected: Vec<&HistoryEntry> = Vec::new();
    let mut terminated = false;

    for entry in candidates
        .into_iter()
        .skip_while(|e| e.entry_type != EntryType::Prime)
    {
        if entry.entry_type.is_delivery() {
            terminated = true;
            break;
        }
        collected.push(entry);
    }

    if !terminated {
        let oldest = collected.last().map(|e| e.timestamp);
        for entry in window
            .newest_first_of(&PRIME_HISTORY_TYPES)
            .into_iter()
            .filter(|e| oldest.is_none_or(|o| e.timestamp <= o))
        {
            if entry.entry_type.is_delivery() {
                terminated = true;
                break;
            }
            collected.push(entry);
        }
    }

    if !terminated {
        debug!(
            "Prime stop not finished, deferring [collected={}]",
            collected.len()
        );
        return None;
    }

    let end = collected
        .iter()
        .find(|e| e.entry_type == EntryType::Prime)
        .copied()?;

    let start = collected
        .iter()
        .filter(|e| e.entry_type == EntryType::NoDeliveryAlarm)
        .min_by_key(|e| e.timestamp)
        .or_else(|| {
            collected
                .iter()
                .filter(|e| e.entry_type == EntryType::Rewind)
                .max_by_key(|e| e.timestamp)
        })
        .copied();

    match start {
        Some(start) => {
            debug!("Prime stop reconstructed [start={}, end={}]", start, end);
            Some(PumpStopInterval::new(start.clone(), end.clone()))
        }
        None => {
            debug!("Prime {} without rewind or no-delivery alarm", end);
            None
        }
    }
}

/// All pump-stop intervals found among the new events.
pub fn pump_stop_intervals(new_events: &[HistoryEntry], window: &HistoryWindow) -> Vec<PumpStopInterval> {
    let mut intervals = pair_suspend_resume(new_events, window);
    intervals.extend(pair_prime_stop(new_events, window));
    intervals
}
