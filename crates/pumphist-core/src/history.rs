//! The reconciliation cycle.
//!
//! A cycle runs `add_batch` → `filter_new` → `process` → `finalize`:
//!
//! ```
//! use pumphist_core::mock::{FixedClock, MockStore, RecordingSink};
//! use pumphist_core::{HistoryOptions, PumpHistory};
//! use pumphist_types::{BolusDto, DeviceTimestamp, EntryType, HistoryEntry, Payload};
//! use time::macros::datetime;
//!
//! let mut history = PumpHistory::new(HistoryOptions::default());
//! let mut store = MockStore::new();
//! let mut clock = FixedClock::in_sync(datetime!(2026-10-16 12:00:00));
//! let mut sink = RecordingSink::default();
//!
//! history.add_batch([HistoryEntry::new(
//!     EntryType::Bolus,
//!     DeviceTimestamp::from_raw(20261016113000),
//!     4,
//! )
//! .with_payload(Payload::Bolus(BolusDto::normal(2.0)))]);
//!
//! let report = history.process(&mut store, &mut clock).unwrap();
//! assert_eq!(report.boluses.inserted, 1);
//!
//! history.finalize(&mut sink).unwrap();
//! assert_eq!(history.window().len(), 1);
//! assert!(history.new_entries().is_empty());
//! ```

use time::{Date, OffsetDateTime};
use tracing::{debug, info, warn};

use pumphist_types::{BasalProfile, HistoryEntry};

use crate::clock::ClockCorrelator;
use crate::error::Result;
use crate::filter::BatchFilter;
use crate::options::HistoryOptions;
use crate::pairing::pump_stop_intervals;
use crate::reconcile::{CycleReport, Reconciler};
use crate::retention::{RetentionTrimmer, TrimOutcome};
use crate::signals;
use crate::traits::{ClockSource, StatisticsSink, TherapyStore};
use crate::window::HistoryWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleState {
    Collecting,
    Filtered,
    Processed,
}

/// Pump history reconciliation engine.
///
/// Owns the retained window and the batch of the cycle in progress. One
/// cycle at a time; all methods take `&mut self`.
#[derive(Debug)]
pub struct PumpHistory {
    options: HistoryOptions,
    trimmer: RetentionTrimmer,
    window: HistoryWindow,
    new_batch: Vec<HistoryEntry>,
    new_events: Vec<HistoryEntry>,
    state: CycleState,
    in_init: bool,
}

impl PumpHistory {
    pub fn new(options: HistoryOptions) -> Self {
        Self::with_window(options, HistoryWindow::new())
    }

    /// Resume with a window saved by an earlier run.
    pub fn with_window(options: HistoryOptions, window: HistoryWindow) -> Self {
        Self {
            trimmer: RetentionTrimmer::new(options.retention),
            options,
            window,
            new_batch: Vec::new(),
            new_events: Vec::new(),
            state: CycleState::Collecting,
            in_init: false,
        }
    }

    pub fn options(&self) -> &HistoryOptions {
        &self.options
    }

    pub fn window(&self) -> &HistoryWindow {
        &self.window
    }

    /// Raw entries added in the current cycle.
    pub fn new_entries(&self) -> &[HistoryEntry] {
        &self.new_batch
    }

    /// Filtered events of the current cycle.
    pub fn new_events(&self) -> &[HistoryEntry] {
        &self.new_events
    }

    /// Mark the bootstrap phase, during which change signals report nothing.
    pub fn set_in_init(&mut self, in_init: bool) {
        self.in_init = in_init;
    }

    pub fn is_in_init(&self) -> bool {
        self.in_init
    }

    /// Add fetched entries to the current batch.
    ///
    /// Entries already in the window or the batch are ignored. Returns the
    /// number of entries added.
    pub fn add_batch(&mut self, entries: impl IntoIterator<Item = HistoryEntry>) -> usize {
        let mut added = 0;
        for entry in entries {
            if self.window.contains(&entry) || self.new_batch.iter().any(|e| e.same_record(&entry)) {
                continue;
            }
            self.new_batch.push(entry);
            added += 1;
        }

        if added > 0 {
            self.state = CycleState::Collecting;
        }
        debug!(
            "Added {} entries to new batch [batchSize={}]",
            added,
            self.new_batch.len()
        );
        added
    }

    /// Filter the batch using today's local date.
    pub fn filter_new(&mut self) -> &[HistoryEntry] {
        let today = OffsetDateTime::now_local()
            .unwrap_or_else(|_| OffsetDateTime::now_utc())
            .date();
        self.filter_new_at(today)
    }

    /// Filter the batch, treating `today` as the current pump day.
    pub fn filter_new_at(&mut self, today: Date) -> &[HistoryEntry] {
        self.new_events = BatchFilter::new(today).filter(&self.new_batch, &self.window);
        self.state = CycleState::Filtered;
        &self.new_events
    }

    /// Reconcile the new events with the store.
    ///
    /// Reads the clock once. If the batch has not been filtered yet it is
    /// filtered with the pump's current date.
    pub fn process<S, C>(&mut self, store: &mut S, clock: &mut C) -> Result<CycleReport>
    where
        S: TherapyStore + ?Sized,
        C: ClockSource + ?Sized,
    {
        let offset = clock.read_clock()?;
        if self.state == CycleState::Collecting {
            self.filter_new_at(offset.pump_time.date());
        }

        let correlator = ClockCorrelator::new(offset);
        let intervals = pump_stop_intervals(&self.new_events, &self.window);
        debug!(
            "Processing {} events [pumpStops={}, offsetSec={}]",
            self.new_events.len(),
            intervals.len(),
            offset.offset_seconds
        );

        let report = Reconciler::new(&self.options, correlator).reconcile(
            &self.new_events,
            &intervals,
            store,
        )?;

        for entry in &mut self.new_events {
            if let Some(link) = report.links.iter().find(|l| l.applies_to(entry)) {
                entry.linked_record = Some(link.record);
            }
        }

        self.state = CycleState::Processed;
        Ok(report)
    }

    /// Close the cycle: absorb the processed events, trim the window and
    /// report the newest entry to `sink`.
    ///
    /// A batch that was never processed stays pending for the next cycle.
    pub fn finalize<K>(&mut self, sink: &mut K) -> Result<TrimOutcome>
    where
        K: StatisticsSink + ?Sized,
    {
        if self.state == CycleState::Processed {
            let absorbed = self.window.insert_all_new(self.new_events.drain(..));
            self.new_batch.clear();
            self.state = CycleState::Collecting;
            debug!("Absorbed {} events into history window", absorbed);
        } else if !self.new_batch.is_empty() {
            warn!(
                "Finalizing without processing, keeping {} pending entries",
                self.new_batch.len()
            );
        }

        let outcome = self.trimmer.apply(&mut self.window);

        if let Some(latest) = self.window.latest_timestamp() {
            sink.record_latest_entry(latest)?;
        }

        info!("History window holds {} entries", self.window.len());
        Ok(outcome)
    }

    /// Whether the pump is stopped according to the newest relevant entry.
    pub fn pump_is_suspended(&self) -> bool {
        signals::pump_is_suspended(&self.window, &self.new_events)
    }

    /// Whether the current events contain a basal profile change.
    pub fn basal_profile_changed(&self) -> bool {
        !self.in_init && signals::basal_profile_changed(&self.new_events)
    }

    /// Whether the current events contain a pump clock change.
    pub fn pump_clock_changed(&self) -> bool {
        !self.in_init && signals::pump_clock_changed(&self.new_events)
    }

    /// Whether the current events contain a relevant settings change.
    pub fn relevant_config_changed(&self) -> bool {
        !self.in_init && signals::relevant_config_changed(&self.new_events)
    }

    /// Profile stored by the newest basal profile change of the current events.
    pub fn latest_known_profile(&self) -> Option<&BasalProfile> {
        if self.in_init {
            return None;
        }
        signals::latest_known_profile(&self.new_events)
    }
}
