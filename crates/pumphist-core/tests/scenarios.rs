//! End-to-end reconciliation cycles against the in-memory store.

use pumphist_core::mock::{FixedClock, MockStore, RecordingSink};
use pumphist_core::{HistoryOptions, PumpHistory, TrimOutcome};
use pumphist_types::{
    BolusDto, BolusRecord, ClockOffset, DailyTotalsDto, DeviceTimestamp, EntryType, HistoryEntry,
    Payload, RecordKind, RecordSource, TempBasalPair,
};
use time::macros::{date, datetime};
use time::{Duration, PrimitiveDateTime};

fn at(dt: PrimitiveDateTime, entry_type: EntryType, pump_id: u64) -> HistoryEntry {
    HistoryEntry::new(entry_type, DeviceTimestamp::from_datetime(dt), pump_id)
}

fn temp_basal_half(
    dt: PrimitiveDateTime,
    entry_type: EntryType,
    pump_id: u64,
    rate: f64,
    minutes: u32,
) -> HistoryEntry {
    at(dt, entry_type, pump_id)
        .with_raw_token(&b"A"[..])
        .with_payload(Payload::TempBasal(TempBasalPair {
            insulin_rate: rate,
            duration_minutes: minutes,
            is_percent: false,
        }))
}

fn end_result_totals(day_start: PrimitiveDateTime, pump_id: u64) -> HistoryEntry {
    at(day_start, EntryType::EndResultTotals, pump_id).with_payload(Payload::DailyTotals(
        DailyTotalsDto {
            total_insulin: 38.5,
            basal_insulin: 18.0,
            bolus_insulin: 20.5,
        },
    ))
}

#[test]
fn bolus_without_persisted_match_is_inserted() {
    let t = datetime!(2026-10-16 10:00:00);
    let mut history = PumpHistory::new(HistoryOptions::default());
    let mut store = MockStore::new();
    let mut clock = FixedClock::in_sync(datetime!(2026-10-16 10:20:00));
    let mut sink = RecordingSink::default();

    history.add_batch([at(t, EntryType::Bolus, 7).with_payload(Payload::Bolus(BolusDto::normal(2.5)))]);
    let report = history.process(&mut store, &mut clock).unwrap();
    history.finalize(&mut sink).unwrap();

    assert_eq!(report.boluses.inserted, 1);
    assert_eq!(store.boluses().len(), 1);
    let bolus = &store.boluses()[0];
    assert_eq!(bolus.pump_id, 7);
    assert_eq!(bolus.insulin, 2.5);
    assert_eq!(bolus.local_time, t);
    assert_eq!(sink.latest(), Some(DeviceTimestamp::from_datetime(t)));
}

#[test]
fn bolus_updates_manual_entry_within_tolerance() {
    let t = datetime!(2026-10-16 10:00:00);
    let manual = |local_time| BolusRecord {
        id: 0,
        local_time,
        source: RecordSource::User,
        pump_id: 0,
        insulin: 2.5,
        carbs: 40.0,
    };
    let mut store = MockStore::new()
        .with_bolus(manual(t + Duration::seconds(25)))
        .with_bolus(manual(t + Duration::minutes(3)));
    // Pump clock 30 seconds behind local time.
    let mut clock = FixedClock::new(ClockOffset::between(
        datetime!(2026-10-16 10:20:00),
        datetime!(2026-10-16 10:20:30),
    ));
    let mut history = PumpHistory::new(HistoryOptions::default());

    history.add_batch([at(t, EntryType::Bolus, 7).with_payload(Payload::Bolus(BolusDto::normal(2.5)))]);
    let report = history.process(&mut store, &mut clock).unwrap();

    assert_eq!(report.boluses.updated, 1);
    assert_eq!(store.boluses().len(), 2);
    let updated = store.bolus(1).unwrap();
    assert_eq!(updated.pump_id, 7);
    assert_eq!(updated.carbs, 40.0);
    assert_eq!(updated.local_time, t + Duration::seconds(25));
}

#[test]
fn temp_basal_halves_become_one_temp_rate() {
    let t = datetime!(2026-10-16 10:00:00);
    let mut history = PumpHistory::new(HistoryOptions::default());
    let mut store = MockStore::new();
    let mut clock = FixedClock::in_sync(datetime!(2026-10-16 10:20:00));
    let mut sink = RecordingSink::default();

    history.add_batch([
        temp_basal_half(t, EntryType::TempBasalRate, 40, 1.2, 0),
        temp_basal_half(t, EntryType::TempBasalDuration, 41, 0.0, 30),
    ]);
    let events = history.filter_new_at(date!(2026-10-16)).to_vec();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].entry_type, EntryType::TempBasalCombined);
    assert_eq!(
        events[0].payload.as_temp_basal(),
        Some(&TempBasalPair::absolute(1.2, 30))
    );

    let report = history.process(&mut store, &mut clock).unwrap();
    history.finalize(&mut sink).unwrap();

    assert_eq!(report.temp_rates.inserted, 1);
    let rates = store.temp_rates();
    assert_eq!(rates.len(), 1);
    assert_eq!(rates[0].rate, 1.2);
    assert_eq!(rates[0].duration_minutes, 30);
    assert_eq!(rates[0].pump_id, 40);
    assert!(rates[0].is_absolute);

    // Raw halves are never retained; the combined entry is.
    assert_eq!(history.window().len(), 1);
    assert!(history.window().iter().all(|e| e.entry_type == EntryType::TempBasalCombined));
}

#[test]
fn temp_basal_split_across_cycles_pairs_later() {
    let t = datetime!(2026-10-16 10:00:00);
    let mut history = PumpHistory::new(HistoryOptions::default());
    let mut store = MockStore::new();
    let mut clock = FixedClock::in_sync(datetime!(2026-10-16 10:20:00));
    let mut sink = RecordingSink::default();

    history.add_batch([temp_basal_half(t, EntryType::TempBasalRate, 40, 1.2, 0)]);
    let first = history.process(&mut store, &mut clock).unwrap();
    history.finalize(&mut sink).unwrap();
    assert_eq!(first.temp_rates.written(), 0);
    assert!(history.window().is_empty());

    // Next fetch overlaps and now holds both halves.
    history.add_batch([
        temp_basal_half(t, EntryType::TempBasalRate, 40, 1.2, 0),
        temp_basal_half(t, EntryType::TempBasalDuration, 41, 0.0, 30),
    ]);
    let second = history.process(&mut store, &mut clock).unwrap();
    history.finalize(&mut sink).unwrap();
    assert_eq!(second.temp_rates.inserted, 1);

    // A third overlapping fetch adds nothing.
    history.add_batch([
        temp_basal_half(t, EntryType::TempBasalRate, 40, 1.2, 0),
        temp_basal_half(t, EntryType::TempBasalDuration, 41, 0.0, 30),
    ]);
    let third = history.process(&mut store, &mut clock).unwrap();
    history.finalize(&mut sink).unwrap();
    assert_eq!(third.records_written(), 0);
    assert_eq!(store.temp_rates().len(), 1);
}

#[test]
fn open_suspend_is_left_for_next_cycle() {
    let t3 = datetime!(2026-10-16 08:00:00);
    let t2 = datetime!(2026-10-16 08:40:00);
    let t1 = datetime!(2026-10-16 09:30:00);
    let mut history = PumpHistory::new(HistoryOptions::default());
    let mut store = MockStore::new();
    let mut clock = FixedClock::in_sync(datetime!(2026-10-16 10:00:00));

    history.add_batch([
        at(t1, EntryType::Suspend, 51),
        at(t2, EntryType::Resume, 52),
        at(t3, EntryType::Suspend, 53),
    ]);
    let report = history.process(&mut store, &mut clock).unwrap();

    assert_eq!(report.pump_stops.inserted, 1);
    let stops = store.temp_rates();
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].pump_id, 53);
    assert_eq!(stops[0].local_time, t3);
    assert_eq!(stops[0].duration_minutes, 40);
    assert_eq!(stops[0].rate, 0.0);
    assert!(history.pump_is_suspended());

    let linked: Vec<u64> = history
        .new_events()
        .iter()
        .filter(|e| e.linked_record.is_some_and(|l| l.kind == RecordKind::TempRate))
        .map(|e| e.pump_id)
        .collect();
    assert_eq!(linked, vec![53, 52]);
}

#[test]
fn resume_closes_suspend_from_previous_cycle() {
    let mut history = PumpHistory::new(HistoryOptions::default());
    let mut store = MockStore::new();
    let mut clock = FixedClock::in_sync(datetime!(2026-10-16 10:00:00));
    let mut sink = RecordingSink::default();

    history.add_batch([at(datetime!(2026-10-16 09:00:00), EntryType::Suspend, 61)]);
    history.process(&mut store, &mut clock).unwrap();
    history.finalize(&mut sink).unwrap();
    assert!(store.temp_rates().is_empty());
    assert!(history.pump_is_suspended());

    history.add_batch([at(datetime!(2026-10-16 09:25:00), EntryType::Resume, 62)]);
    let report = history.process(&mut store, &mut clock).unwrap();

    assert_eq!(report.pump_stops.inserted, 1);
    assert_eq!(store.temp_rates()[0].pump_id, 61);
    assert_eq!(store.temp_rates()[0].duration_minutes, 25);
    assert!(!history.pump_is_suspended());
}

#[test]
fn reservoir_change_creates_pump_stop() {
    let mut history = PumpHistory::new(HistoryOptions::default());
    let mut store = MockStore::new();
    let mut clock = FixedClock::in_sync(datetime!(2026-10-16 10:00:00));

    history.add_batch([
        at(datetime!(2026-10-16 08:00:00), EntryType::Bolus, 70)
            .with_payload(Payload::Bolus(BolusDto::normal(1.0))),
        at(datetime!(2026-10-16 09:00:00), EntryType::NoDeliveryAlarm, 71),
        at(datetime!(2026-10-16 09:10:00), EntryType::Rewind, 72),
        at(datetime!(2026-10-16 09:15:00), EntryType::Prime, 73),
    ]);
    let report = history.process(&mut store, &mut clock).unwrap();

    assert_eq!(report.boluses.inserted, 1);
    assert_eq!(report.pump_stops.inserted, 1);
    let stop = &store.temp_rates()[0];
    assert_eq!(stop.pump_id, 71);
    assert_eq!(stop.duration_minutes, 15);
    assert!(!history.pump_is_suspended());
}

#[test]
fn todays_end_result_totals_wait_for_day_change() {
    let mut history = PumpHistory::new(HistoryOptions::default());
    let mut store = MockStore::new();
    let mut sink = RecordingSink::default();
    let totals = end_result_totals(datetime!(2026-10-16 00:00:00), 80);

    let mut clock = FixedClock::in_sync(datetime!(2026-10-16 18:00:00));
    history.add_batch([totals.clone()]);
    assert!(history.filter_new_at(date!(2026-10-16)).is_empty());
    let report = history.process(&mut store, &mut clock).unwrap();
    history.finalize(&mut sink).unwrap();
    assert_eq!(report.daily_totals.written(), 0);
    assert!(history.window().is_empty());

    clock.set_offset(ClockOffset::in_sync(datetime!(2026-10-17 00:10:00)));
    history.add_batch([totals]);
    let events = history.filter_new_at(date!(2026-10-17)).to_vec();
    assert_eq!(events.len(), 1);
    let report = history.process(&mut store, &mut clock).unwrap();
    history.finalize(&mut sink).unwrap();

    assert_eq!(report.daily_totals.inserted, 1);
    assert_eq!(store.daily_totals()[0].day, date!(2026-10-16));
    assert_eq!(store.daily_totals()[0].total_insulin, 38.5);
}

#[test]
fn window_keeps_one_day_of_history() {
    let mut history = PumpHistory::new(HistoryOptions::default());
    let mut store = MockStore::new();
    let mut clock = FixedClock::in_sync(datetime!(2026-10-17 12:00:00));
    let mut sink = RecordingSink::default();

    history.add_batch([
        at(datetime!(2026-10-15 09:00:00), EntryType::LowReservoir, 1),
        at(datetime!(2026-10-16 11:00:00), EntryType::LowReservoir, 2),
        at(datetime!(2026-10-16 13:00:00), EntryType::BatteryChange, 3),
        at(datetime!(2026-10-17 11:30:00), EntryType::LowBattery, 4),
    ]);
    history.process(&mut store, &mut clock).unwrap();
    let outcome = history.finalize(&mut sink).unwrap();

    assert!(matches!(outcome, TrimOutcome::Trimmed { removed: 2, .. }));
    let kept: Vec<u64> = history.window().iter().map(|e| e.pump_id).collect();
    assert_eq!(kept, vec![3, 4]);
}

#[test]
fn corrupt_entry_does_not_stop_window_trimming() {
    let mut history = PumpHistory::new(HistoryOptions::default());
    let mut store = MockStore::new();
    let mut clock = FixedClock::in_sync(datetime!(2026-10-16 12:00:00));
    let mut sink = RecordingSink::default();

    // Month 99 sorts after every valid timestamp.
    history.add_batch([
        HistoryEntry::new(EntryType::LowReservoir, DeviceTimestamp::from_raw(20269916120000), 1),
        at(datetime!(2026-10-15 09:00:00), EntryType::LowBattery, 2),
        at(datetime!(2026-10-16 11:00:00), EntryType::LowReservoir, 3),
    ]);
    history.process(&mut store, &mut clock).unwrap();
    let outcome = history.finalize(&mut sink).unwrap();
    assert!(matches!(outcome, TrimOutcome::Trimmed { removed: 2, .. }));

    clock.set_offset(ClockOffset::in_sync(datetime!(2026-10-17 12:00:00)));
    history.add_batch([at(datetime!(2026-10-17 11:30:00), EntryType::LowBattery, 4)]);
    history.process(&mut store, &mut clock).unwrap();
    let outcome = history.finalize(&mut sink).unwrap();

    assert!(matches!(outcome, TrimOutcome::Trimmed { removed: 1, .. }));
    let kept: Vec<u64> = history.window().iter().map(|e| e.pump_id).collect();
    assert_eq!(kept, vec![4]);
    assert_eq!(
        sink.latest(),
        Some(DeviceTimestamp::from_datetime(datetime!(2026-10-17 11:30:00)))
    );
}

#[test]
fn duplicate_delivery_is_idempotent() {
    let t = datetime!(2026-10-16 10:00:00);
    let batch = vec![
        at(t, EntryType::Bolus, 7).with_payload(Payload::Bolus(BolusDto::normal(2.5))),
        at(t + Duration::minutes(5), EntryType::Suspend, 8),
        at(t + Duration::minutes(20), EntryType::Resume, 9),
    ];
    let mut history = PumpHistory::new(HistoryOptions::default());
    let mut store = MockStore::new();
    let mut clock = FixedClock::in_sync(datetime!(2026-10-16 10:30:00));
    let mut sink = RecordingSink::default();

    history.add_batch(batch.clone());
    history.process(&mut store, &mut clock).unwrap();
    history.finalize(&mut sink).unwrap();
    let upserts = store.upsert_count();

    assert_eq!(history.add_batch(batch), 0);
    let report = history.process(&mut store, &mut clock).unwrap();
    history.finalize(&mut sink).unwrap();

    assert_eq!(report.events, 0);
    assert_eq!(store.upsert_count(), upserts);
    assert_eq!(store.boluses().len(), 1);
    assert_eq!(store.temp_rates().len(), 1);
}
