//! Reconciliation of new events with the therapy store.
//!
//! For each category of event the reconciler queries the records the store
//! already holds around the events' time, decides per event whether it
//! updates an existing record or creates a new one, and upserts the result.
//! Records are never deleted.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::Date;
use tracing::{debug, error, info, warn};

use pumphist_types::{
    BolusDto, BolusRecord, BolusType, DailyTotalRecord, DeviceTimestamp, EntryType,
    ExtendedBolusRecord, HistoryEntry, RecordLink, RecordSource, TempRateRecord, TherapyRecord,
    Timestamped,
};

use crate::clock::ClockCorrelator;
use crate::correlate::{Correlation, Correlator};
use crate::error::Result;
use crate::options::HistoryOptions;
use crate::pairing::PumpStopInterval;
use crate::traits::TherapyStore;

/// Upsert counts for one record category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl CategoryReport {
    fn count_upsert(&mut self, created: bool) {
        if created {
            self.inserted += 1;
        } else {
            self.updated += 1;
        }
    }

    /// Number of records written.
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Link from a new event to the record it was reconciled into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryLink {
    pub entry_type: EntryType,
    pub timestamp: DeviceTimestamp,
    pub pump_id: u64,
    pub record: RecordLink,
}

impl EntryLink {
    fn new(entry: &HistoryEntry, record: RecordLink) -> Self {
        Self {
            entry_type: entry.entry_type,
            timestamp: entry.timestamp,
            pump_id: entry.pump_id,
            record,
        }
    }

    /// Whether this link belongs to `entry`.
    pub fn applies_to(&self, entry: &HistoryEntry) -> bool {
        self.entry_type == entry.entry_type
            && self.timestamp == entry.timestamp
            && self.pump_id == entry.pump_id
    }
}

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Number of new events reconciled.
    pub events: usize,
    pub boluses: CategoryReport,
    pub extended_boluses: CategoryReport,
    pub temp_rates: CategoryReport,
    pub pump_stops: CategoryReport,
    pub daily_totals: CategoryReport,
    /// Events inserted because several records matched equally well.
    pub ambiguous_matches: usize,
    pub links: Vec<EntryLink>,
}

impl CycleReport {
    /// Total number of records written in the cycle.
    pub fn records_written(&self) -> usize {
        self.boluses.written()
            + self.extended_boluses.written()
            + self.temp_rates.written()
            + self.pump_stops.written()
            + self.daily_totals.written()
    }
}

/// Orchestrates correlation and persistence for one cycle.
pub struct Reconciler<'a> {
    options: &'a HistoryOptions,
    clock: ClockCorrelator,
    correlator: Correlator,
}

impl<'a> Reconciler<'a> {
    pub fn new(options: &'a HistoryOptions, clock: ClockCorrelator) -> Self {
        Self {
            options,
            clock,
            correlator: Correlator::new(clock),
        }
    }

    /// Reconcile the sorted new events and the pump-stop intervals built from
    /// them.
    pub fn reconcile<S>(
        &self,
        events: &[HistoryEntry],
        intervals: &[PumpStopInterval],
        store: &mut S,
    ) -> Result<CycleReport>
    where
        S: TherapyStore + ?Sized,
    {
        let mut report = CycleReport {
            events: events.len(),
            ..Default::default()
        };

        self.reconcile_boluses(events, store, &mut report)?;
        self.reconcile_temp_rates(events, store, &mut report)?;
        self.reconcile_pump_stops(intervals, store, &mut report)?;
        self.reconcile_daily_totals(events, store, &mut report)?;

        info!(
            "Reconciled {} events [boluses={:?}, extended={:?}, tempRates={:?}, pumpStops={:?}, totals={:?}, ambiguous={}]",
            report.events,
            report.boluses,
            report.extended_boluses,
            report.temp_rates,
            report.pump_stops,
            report.daily_totals,
            report.ambiguous_matches
        );

        Ok(report)
    }

    fn reconcile_boluses<S>(
        &self,
        events: &[HistoryEntry],
        store: &mut S,
        report: &mut CycleReport,
    ) -> Result<()>
    where
        S: TherapyStore + ?Sized,
    {
        let mut normal = Vec::new();
        let mut extended = Vec::new();

        for entry in events.iter().filter(|e| e.entry_type == EntryType::Bolus) {
            match entry.payload.as_bolus() {
                Some(dto) if dto.bolus_type == BolusType::Normal => normal.push((entry, dto)),
                Some(dto) => extended.push((entry, dto)),
                None => {
                    warn!("Bolus entry without bolus payload: {}", entry);
                    report.boluses.skipped += 1;
                }
            }
        }

        for (entry, dto) in extended {
            let Some(local_time) = self.clock.try_local_time(entry) else {
                report.extended_boluses.skipped += 1;
                continue;
            };
            let record = TherapyRecord::ExtendedBolus(ExtendedBolusRecord {
                id: 0,
                local_time,
                source: RecordSource::Pump,
                pump_id: entry.pump_id,
                insulin: dto.delivered_amount,
                duration_minutes: dto.duration_minutes,
            });
            let created = store.upsert(&record)?;
            report.extended_boluses.count_upsert(created);
            report.links.push(EntryLink::new(entry, record.link()));
        }

        if normal.is_empty() {
            return Ok(());
        }

        let entries: Vec<&HistoryEntry> = normal.iter().map(|(e, _)| *e).collect();
        let since = self.clock.query_lower_bound(
            &entries,
            self.options.lookback_margin,
            self.options.default_lookback,
        );
        let mut records = store.boluses_since(since)?;
        debug!("Bolus candidates since {}: {}", since, records.len());

        let normal = strip_known(normal, &mut records, |(e, _)| *e, |r, e| {
            report.boluses.skipped += 1;
            report.links.push(EntryLink::new(e, TherapyRecord::Bolus(r).link()));
        });

        let mut claimed = HashSet::new();
        for (entry, dto) in normal {
            let carbs = entry.estimate.as_ref().map(|w| w.carbs);
            let record = match self.take_match(entry, &records, &mut claimed, report) {
                Some(existing) => {
                    debug!("Updating bolus {} from {}", existing.id, entry);
                    BolusRecord {
                        id: existing.id,
                        local_time: existing.local_time,
                        source: RecordSource::Pump,
                        pump_id: entry.pump_id,
                        insulin: dto.delivered_amount,
                        carbs: carbs.unwrap_or(existing.carbs),
                    }
                }
                None => match self.clock.try_local_time(entry) {
                    Some(local_time) => new_bolus(entry, dto, local_time, carbs),
                    None => {
                        report.boluses.skipped += 1;
                        continue;
                    }
                },
            };

            let record = TherapyRecord::Bolus(record);
            let created = store.upsert(&record)?;
            report.boluses.count_upsert(created);
            report.links.push(EntryLink::new(entry, record.link()));
        }

        Ok(())
    }

    fn reconcile_temp_rates<S>(
        &self,
        events: &[HistoryEntry],
        store: &mut S,
        report: &mut CycleReport,
    ) -> Result<()>
    where
        S: TherapyStore + ?Sized,
    {
        let mut tbrs = Vec::new();
        for entry in events
            .iter()
            .filter(|e| e.entry_type == EntryType::TempBasalCombined)
        {
            match entry.payload.as_temp_basal() {
                Some(pair) => tbrs.push((entry, pair)),
                None => {
                    warn!("Temp basal entry without temp basal payload: {}", entry);
                    report.temp_rates.skipped += 1;
                }
            }
        }

        if tbrs.is_empty() {
            return Ok(());
        }

        let entries: Vec<&HistoryEntry> = tbrs.iter().map(|(e, _)| *e).collect();
        let since = self.clock.query_lower_bound(
            &entries,
            self.options.lookback_margin,
            self.options.default_lookback,
        );
        let mut records = store.temp_rates_since(since)?;
        debug!("Temp rate candidates since {}: {}", since, records.len());

        let tbrs = strip_known(tbrs, &mut records, |(e, _)| *e, |r, e| {
            report.temp_rates.skipped += 1;
            report.links.push(EntryLink::new(e, TherapyRecord::TempRate(r).link()));
        });

        let mut claimed = HashSet::new();
        for (entry, pair) in tbrs {
            let (id, local_time) = match self.take_match(entry, &records, &mut claimed, report) {
                Some(existing) => {
                    debug!("Updating temp rate {} from {}", existing.id, entry);
                    (existing.id, existing.local_time)
                }
                None => match self.clock.try_local_time(entry) {
                    Some(local_time) => (0, local_time),
                    None => {
                        report.temp_rates.skipped += 1;
                        continue;
                    }
                },
            };

            let record = TherapyRecord::TempRate(TempRateRecord {
                id,
                local_time,
                source: RecordSource::Pump,
                pump_id: entry.pump_id,
                rate: pair.insulin_rate,
                duration_minutes: pair.duration_minutes,
                is_absolute: !pair.is_percent,
            });
            let created = store.upsert(&record)?;
            report.temp_rates.count_upsert(created);
            report.links.push(EntryLink::new(entry, record.link()));
        }

        Ok(())
    }

    fn reconcile_pump_stops<S>(
        &self,
        intervals: &[PumpStopInterval],
        store: &mut S,
        report: &mut CycleReport,
    ) -> Result<()>
    where
        S: TherapyStore + ?Sized,
    {
        for interval in intervals {
            if let Some(existing) = store.find_temp_rate_by_pump_id(interval.start.pump_id)? {
                debug!(
                    "Pump stop starting at {} already stored as temp rate {}",
                    interval.start, existing.id
                );
                let link = TherapyRecord::TempRate(existing).link();
                report.pump_stops.skipped += 1;
                report.links.push(EntryLink::new(&interval.start, link));
                report.links.push(EntryLink::new(&interval.end, link));
                continue;
            }

            let Some(local_time) = self.clock.try_local_time(&interval.start) else {
                report.pump_stops.skipped += 1;
                continue;
            };
            let duration_minutes = match interval.duration_minutes() {
                Ok(minutes) => minutes,
                Err(e) => {
                    error!(
                        "Could not size pump stop [{} - {}]: {}",
                        interval.start, interval.end, e
                    );
                    report.pump_stops.skipped += 1;
                    continue;
                }
            };

            let record = TherapyRecord::TempRate(TempRateRecord {
                id: 0,
                local_time,
                source: RecordSource::Pump,
                pump_id: interval.start.pump_id,
                rate: 0.0,
                duration_minutes,
                is_absolute: true,
            });
            let created = store.upsert(&record)?;
            report.pump_stops.count_upsert(created);

            let link = record.link();
            report.links.push(EntryLink::new(&interval.start, link));
            report.links.push(EntryLink::new(&interval.end, link));
        }

        Ok(())
    }

    fn reconcile_daily_totals<S>(
        &self,
        events: &[HistoryEntry],
        store: &mut S,
        report: &mut CycleReport,
    ) -> Result<()>
    where
        S: TherapyStore + ?Sized,
    {
        let model_type = self.options.daily_totals_type();
        let mut totals: Vec<&HistoryEntry> = events
            .iter()
            .filter(|e| e.entry_type == model_type)
            .collect();
        if totals.is_empty() {
            totals = events
                .iter()
                .filter(|e| e.entry_type == EntryType::EndResultTotals)
                .collect();
        }

        if totals.is_empty() {
            return Ok(());
        }

        let today = self.clock.local_now().date();
        let mut records = store.daily_totals_for_last_days(self.options.daily_totals_days, today)?;
        debug!("Daily totals known for last {} days: {}", self.options.daily_totals_days, records.len());

        for entry in totals {
            let Some(dto) = entry.payload.as_daily_totals() else {
                warn!("Daily totals entry without totals payload: {}", entry);
                report.daily_totals.skipped += 1;
                continue;
            };
            let day = match entry.timestamp.date() {
                Ok(day) => day,
                Err(e) => {
                    error!("Problem decoding date of {}: {}", entry, e);
                    report.daily_totals.skipped += 1;
                    continue;
                }
            };

            let existing = records.iter().position(|r| r.day == day);
            let record = DailyTotalRecord {
                id: existing.map_or(0, |i| records[i].id),
                day,
                total_insulin: dto.total_insulin,
                basal_insulin: dto.basal_insulin,
                bolus_insulin: dto.bolus_insulin,
            };

            if let Some(i) = existing
                && same_totals(&records[i], &record)
            {
                report.daily_totals.skipped += 1;
                report.links.push(EntryLink::new(
                    entry,
                    TherapyRecord::DailyTotal(records[i].clone()).link(),
                ));
                continue;
            }

            let wrapped = TherapyRecord::DailyTotal(record.clone());
            let created = store.upsert(&wrapped)?;
            report.daily_totals.count_upsert(created);
            report.links.push(EntryLink::new(entry, wrapped.link()));
            upsert_day(&mut records, record, day);
        }

        Ok(())
    }

    /// Correlate `entry` with `records`.
    ///
    /// Each record is claimed by at most one event per cycle. An event whose
    /// match was already claimed is treated as new.
    fn take_match<R: Timestamped + Clone>(
        &self,
        entry: &HistoryEntry,
        records: &[R],
        claimed: &mut HashSet<i64>,
        report: &mut CycleReport,
    ) -> Option<R> {
        match self.correlator.find_match(entry, records) {
            Correlation::Match(found) => {
                if claimed.insert(found.id()) {
                    Some(found.clone())
                } else {
                    debug!(
                        "Record {} already claimed in this cycle, inserting {}",
                        found.id(),
                        entry
                    );
                    None
                }
            }
            Correlation::Ambiguous => {
                report.ambiguous_matches += 1;
                None
            }
            Correlation::NoMatch => None,
        }
    }
}

fn new_bolus(
    entry: &HistoryEntry,
    dto: &BolusDto,
    local_time: time::PrimitiveDateTime,
    carbs: Option<f64>,
) -> BolusRecord {
    BolusRecord {
        id: 0,
        local_time,
        source: RecordSource::Pump,
        pump_id: entry.pump_id,
        insulin: dto.delivered_amount,
        carbs: carbs.unwrap_or(0.0),
    }
}

/// Remove events that correspond 1:1 by non-zero pump id to a record, and
/// that record with them. `on_known` is called for each such pair.
fn strip_known<T, R, K, F>(
    events: Vec<T>,
    records: &mut Vec<R>,
    entry_of: K,
    mut on_known: F,
) -> Vec<T>
where
    R: Timestamped,
    K: Fn(&T) -> &HistoryEntry,
    F: FnMut(R, &HistoryEntry),
{
    let mut remaining = Vec::with_capacity(events.len());
    for event in events {
        let entry = entry_of(&event);
        let known = (entry.pump_id != 0)
            .then(|| records.iter().position(|r| r.pump_id() == entry.pump_id))
            .flatten();
        match known {
            Some(i) => {
                let record = records.remove(i);
                debug!("{} already stored, skipping", entry);
                on_known(record, entry);
            }
            None => remaining.push(event),
        }
    }
    remaining
}

fn same_totals(a: &DailyTotalRecord, b: &DailyTotalRecord) -> bool {
    const EPSILON: f64 = 1e-6;
    (a.total_insulin - b.total_insulin).abs() < EPSILON
        && (a.basal_insulin - b.basal_insulin).abs() < EPSILON
        && (a.bolus_insulin - b.bolus_insulin).abs() < EPSILON
}

fn upsert_day(records: &mut Vec<DailyTotalRecord>, record: DailyTotalRecord, day: Date) {
    match records.iter_mut().find(|r| r.day == day) {
        Some(slot) => *slot = record,
        None => records.push(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockStore;
    use pumphist_types::{BolusWizardDto, ClockOffset, DailyTotalsDto, Payload, TempBasalPair};
    use time::PrimitiveDateTime;
    use time::macros::{date, datetime};

    const NOW: PrimitiveDateTime = datetime!(2026-10-16 12:00:00);

    fn clock(offset_seconds: i64) -> ClockCorrelator {
        ClockCorrelator::new(ClockOffset::between(
            NOW - time::Duration::seconds(offset_seconds),
            NOW,
        ))
    }

    fn at(dt: PrimitiveDateTime, entry_type: EntryType, pump_id: u64) -> HistoryEntry {
        HistoryEntry::new(entry_type, DeviceTimestamp::from_datetime(dt), pump_id)
    }

    fn bolus(dt: PrimitiveDateTime, pump_id: u64, amount: f64) -> HistoryEntry {
        at(dt, EntryType::Bolus, pump_id).with_payload(Payload::Bolus(BolusDto::normal(amount)))
    }

    fn tbr(dt: PrimitiveDateTime, pump_id: u64, rate: f64, minutes: u32, percent: bool) -> HistoryEntry {
        at(dt, EntryType::TempBasalCombined, pump_id).with_payload(Payload::TempBasal(
            TempBasalPair {
                insulin_rate: rate,
                duration_minutes: minutes,
                is_percent: percent,
            },
        ))
    }

    fn stored_bolus(id: i64, local_time: PrimitiveDateTime, pump_id: u64) -> BolusRecord {
        BolusRecord {
            id,
            local_time,
            source: RecordSource::User,
            pump_id,
            insulin: 2.0,
            carbs: 30.0,
        }
    }

    #[test]
    fn test_bolus_inserted_when_store_empty() {
        let options = HistoryOptions::default();
        let mut store = MockStore::new();
        let wizard = BolusWizardDto {
            carbs: 50.0,
            ..Default::default()
        };
        let mut entry = bolus(datetime!(2026-10-16 11:00:00), 7, 3.5);
        entry.estimate = Some(wizard);

        let report = Reconciler::new(&options, clock(60))
            .reconcile(&[entry], &[], &mut store)
            .unwrap();

        assert_eq!(report.boluses.inserted, 1);
        let stored = store.boluses();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].local_time, datetime!(2026-10-16 11:01:00));
        assert_eq!(stored[0].pump_id, 7);
        assert_eq!(stored[0].insulin, 3.5);
        assert_eq!(stored[0].carbs, 50.0);
        assert_eq!(stored[0].source, RecordSource::Pump);
        assert_eq!(report.links.len(), 1);
        assert_eq!(report.links[0].record.kind, pumphist_types::RecordKind::Bolus);
    }

    #[test]
    fn test_bolus_update_keeps_row_time_and_carbs() {
        let options = HistoryOptions::default();
        let mut store = MockStore::new()
            .with_bolus(stored_bolus(0, datetime!(2026-10-16 11:00:04), 0))
            .with_bolus(stored_bolus(0, datetime!(2026-10-16 11:03:00), 0));
        let existing_id = store.boluses()[0].id;

        let report = Reconciler::new(&options, clock(0))
            .reconcile(&[bolus(datetime!(2026-10-16 11:00:00), 7, 2.2)], &[], &mut store)
            .unwrap();

        assert_eq!(report.boluses.updated, 1);
        assert_eq!(report.boluses.inserted, 0);
        let updated = store.bolus(existing_id).unwrap();
        assert_eq!(updated.local_time, datetime!(2026-10-16 11:00:04));
        assert_eq!(updated.carbs, 30.0);
        assert_eq!(updated.insulin, 2.2);
        assert_eq!(updated.pump_id, 7);
    }

    #[test]
    fn test_bolus_with_known_pump_id_is_skipped() {
        let options = HistoryOptions::default();
        let mut store = MockStore::new()
            .with_bolus(stored_bolus(0, datetime!(2026-10-16 11:00:00), 7));

        let report = Reconciler::new(&options, clock(0))
            .reconcile(&[bolus(datetime!(2026-10-16 11:00:00), 7, 2.0)], &[], &mut store)
            .unwrap();

        assert_eq!(report.boluses.skipped, 1);
        assert_eq!(store.upsert_count(), 0);
        assert_eq!(report.links.len(), 1);
    }

    #[test]
    fn test_distant_bolus_does_not_take_leftover_record() {
        let options = HistoryOptions::default();
        let mut store = MockStore::new()
            .with_bolus(stored_bolus(0, datetime!(2026-10-16 10:00:00), 0))
            .with_bolus(stored_bolus(0, datetime!(2026-10-16 10:02:00), 0));
        let events = [
            bolus(datetime!(2026-10-16 10:00:00), 7, 2.0),
            bolus(datetime!(2026-10-16 11:30:00), 8, 4.0),
        ];

        let report = Reconciler::new(&options, clock(0))
            .reconcile(&events, &[], &mut store)
            .unwrap();

        assert_eq!(report.boluses.updated, 1);
        assert_eq!(report.boluses.inserted, 1);
        assert_eq!(store.boluses().len(), 3);

        let untouched = store.bolus(2).unwrap();
        assert_eq!(untouched.local_time, datetime!(2026-10-16 10:02:00));
        assert_eq!(untouched.pump_id, 0);
        assert_eq!(untouched.insulin, 2.0);

        let inserted = store.boluses().iter().find(|r| r.pump_id == 8).unwrap();
        assert_eq!(inserted.local_time, datetime!(2026-10-16 11:30:00));
        assert_eq!(inserted.insulin, 4.0);
    }

    #[test]
    fn test_single_record_is_claimed_once() {
        let options = HistoryOptions::default();
        let mut store =
            MockStore::new().with_bolus(stored_bolus(0, datetime!(2026-10-16 10:00:00), 0));
        let events = [
            bolus(datetime!(2026-10-16 10:00:00), 7, 2.0),
            bolus(datetime!(2026-10-16 11:30:00), 8, 4.0),
        ];

        let report = Reconciler::new(&options, clock(0))
            .reconcile(&events, &[], &mut store)
            .unwrap();

        assert_eq!(report.boluses.updated, 1);
        assert_eq!(report.boluses.inserted, 1);
        assert_eq!(store.bolus(1).unwrap().pump_id, 7);
        let inserted = store.boluses().iter().find(|r| r.pump_id == 8).unwrap();
        assert_eq!(inserted.local_time, datetime!(2026-10-16 11:30:00));
    }

    #[test]
    fn test_malformed_bolus_does_not_narrow_lookback() {
        let options = HistoryOptions::default();
        let mut store =
            MockStore::new().with_bolus(stored_bolus(0, datetime!(2026-10-16 08:00:03), 0));
        let malformed = HistoryEntry::new(EntryType::Bolus, DeviceTimestamp::from_raw(12), 9)
            .with_payload(Payload::Bolus(BolusDto::normal(1.0)));
        let events = [malformed, bolus(datetime!(2026-10-16 08:00:00), 7, 2.0)];

        let report = Reconciler::new(&options, clock(0))
            .reconcile(&events, &[], &mut store)
            .unwrap();

        assert_eq!(report.boluses.updated, 1);
        assert_eq!(report.boluses.inserted, 0);
        assert_eq!(report.boluses.skipped, 1);
        assert_eq!(store.boluses().len(), 1);
        assert_eq!(store.bolus(1).unwrap().pump_id, 7);
    }

    #[test]
    fn test_ambiguous_bolus_is_inserted() {
        let options = HistoryOptions::default();
        let mut store = MockStore::new()
            .with_bolus(stored_bolus(0, datetime!(2026-10-16 11:00:03), 0))
            .with_bolus(stored_bolus(0, datetime!(2026-10-16 10:59:56), 0));

        let report = Reconciler::new(&options, clock(0))
            .reconcile(&[bolus(datetime!(2026-10-16 11:00:00), 7, 1.0)], &[], &mut store)
            .unwrap();

        assert_eq!(report.ambiguous_matches, 1);
        assert_eq!(report.boluses.inserted, 1);
        assert_eq!(store.boluses().len(), 3);
    }

    #[test]
    fn test_extended_bolus_goes_to_extended_records() {
        let options = HistoryOptions::default();
        let mut store = MockStore::new();
        let entry = at(datetime!(2026-10-16 11:00:00), EntryType::Bolus, 9)
            .with_payload(Payload::Bolus(BolusDto::extended(4.0, 120)));

        let report = Reconciler::new(&options, clock(0))
            .reconcile(&[entry], &[], &mut store)
            .unwrap();

        assert_eq!(report.extended_boluses.inserted, 1);
        assert!(store.boluses().is_empty());
        let stored = store.extended_boluses();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].duration_minutes, 120);
        assert_eq!(stored[0].insulin, 4.0);
    }

    #[test]
    fn test_percent_temp_rate_is_not_absolute() {
        let options = HistoryOptions::default();
        let mut store = MockStore::new();

        let report = Reconciler::new(&options, clock(0))
            .reconcile(
                &[tbr(datetime!(2026-10-16 11:00:00), 20, 150.0, 60, true)],
                &[],
                &mut store,
            )
            .unwrap();

        assert_eq!(report.temp_rates.inserted, 1);
        let stored = store.temp_rates();
        assert_eq!(stored[0].rate, 150.0);
        assert_eq!(stored[0].duration_minutes, 60);
        assert!(!stored[0].is_absolute);
    }

    #[test]
    fn test_pump_stop_inserted_once() {
        let options = HistoryOptions::default();
        let mut store = MockStore::new();
        let interval = PumpStopInterval::new(
            at(datetime!(2026-10-16 09:00:00), EntryType::Suspend, 31),
            at(datetime!(2026-10-16 09:45:00), EntryType::Resume, 32),
        );

        let reconciler = Reconciler::new(&options, clock(0));
        let first = reconciler
            .reconcile(&[], std::slice::from_ref(&interval), &mut store)
            .unwrap();
        let second = reconciler
            .reconcile(&[], std::slice::from_ref(&interval), &mut store)
            .unwrap();

        assert_eq!(first.pump_stops.inserted, 1);
        assert_eq!(second.pump_stops.skipped, 1);
        let stored = store.temp_rates();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].rate, 0.0);
        assert_eq!(stored[0].duration_minutes, 45);
        assert!(stored[0].is_absolute);
        assert_eq!(first.links.len(), 2);
    }

    #[test]
    fn test_daily_totals_insert_update_noop() {
        let options = HistoryOptions::default().pump_model(pumphist_types::PumpModel::Mm522);
        let mut store = MockStore::new().with_daily_total(DailyTotalRecord {
            id: 0,
            day: date!(2026-10-14),
            total_insulin: 40.0,
            basal_insulin: 20.0,
            bolus_insulin: 20.0,
        });
        let totals = |raw: u64, total: f64, entry_type: EntryType| {
            HistoryEntry::new(entry_type, DeviceTimestamp::from_raw(raw), 0).with_payload(
                Payload::DailyTotals(DailyTotalsDto {
                    total_insulin: total,
                    basal_insulin: 20.0,
                    bolus_insulin: total - 20.0,
                }),
            )
        };
        let events = vec![
            totals(20261014000000, 40.0, EntryType::DailyTotals522),
            totals(20261015000000, 42.0, EntryType::DailyTotals522),
            // Ignored: model-specific entries are present.
            totals(20261015000000, 99.0, EntryType::EndResultTotals),
        ];

        let report = Reconciler::new(&options, clock(0))
            .reconcile(&events, &[], &mut store)
            .unwrap();
        assert_eq!(report.daily_totals.skipped, 1);
        assert_eq!(report.daily_totals.inserted, 1);

        let update = vec![totals(20261015000000, 43.5, EntryType::DailyTotals522)];
        let report = Reconciler::new(&options, clock(0))
            .reconcile(&update, &[], &mut store)
            .unwrap();
        assert_eq!(report.daily_totals.updated, 1);

        let stored = store.daily_totals();
        assert_eq!(stored.len(), 2);
        let day = stored.iter().find(|r| r.day == date!(2026-10-15)).unwrap();
        assert_eq!(day.total_insulin, 43.5);
    }

    #[test]
    fn test_store_error_is_returned() {
        let options = HistoryOptions::default();
        let mut store = MockStore::new();
        store.fail_with("disk full");

        let result = Reconciler::new(&options, clock(0)).reconcile(
            &[bolus(datetime!(2026-10-16 11:00:00), 7, 1.0)],
            &[],
            &mut store,
        );
        assert!(matches!(result, Err(crate::Error::Store { .. })));
    }
}
