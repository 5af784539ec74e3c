//! Selection of the new events of a fetched batch.

use time::Date;
use tracing::debug;

use pumphist_types::{EntryType, HistoryEntry};

use crate::pairing::pair_temp_basals;
use crate::window::HistoryWindow;

/// Turns the raw new batch into the sorted list of events to reconcile.
///
/// - entries already in the window are dropped;
/// - temporary basal halves are replaced by their combined entry, which is
///   itself dropped when the window already knows it;
/// - `EndResultTotals` of `today` are held back until the day is closed;
/// - bolus wizard estimates are attached to the bolus with the same
///   timestamp (and kept in the output).
#[derive(Debug, Clone, Copy)]
pub struct BatchFilter {
    today: Date,
}

impl BatchFilter {
    /// A filter treating `today` as the current pump calendar day.
    pub fn new(today: Date) -> Self {
        Self { today }
    }

    pub fn today(&self) -> Date {
        self.today
    }

    /// Filter `batch` against `window`. The result is sorted by timestamp.
    pub fn filter(&self, batch: &[HistoryEntry], window: &HistoryWindow) -> Vec<HistoryEntry> {
        let mut events = Vec::with_capacity(batch.len());
        let mut tbr_parts = Vec::new();
        let mut held_totals = 0;

        for entry in batch.iter().filter(|e| !window.contains(e)) {
            if entry.entry_type.is_temp_basal_part() {
                tbr_parts.push(entry.clone());
            } else if entry.entry_type == EntryType::EndResultTotals
                && entry.timestamp.is_same_day(self.today)
            {
                held_totals += 1;
            } else {
                events.push(entry.clone());
            }
        }

        let combined = pair_temp_basals(tbr_parts);
        let combined_count = combined.len();
        events.extend(combined.into_iter().filter(|e| !window.contains(e)));

        attach_estimates(&mut events);
        events.sort_by_key(|e| e.timestamp);

        debug!(
            "Filtered new batch [batch={}, events={}, combinedTbr={}, heldTotals={}]",
            batch.len(),
            events.len(),
            combined_count,
            held_totals
        );

        events
    }
}

fn attach_estimates(events: &mut [HistoryEntry]) {
    let estimates: Vec<_> = events
        .iter()
        .filter(|e| e.entry_type == EntryType::BolusWizardEstimate)
        .filter_map(|e| e.payload.as_bolus_wizard().map(|w| (e.timestamp, w.clone())))
        .collect();

    if estimates.is_empty() {
        return;
    }

    for bolus in events
        .iter_mut()
        .filter(|e| e.entry_type == EntryType::Bolus)
    {
        if let Some((_, wizard)) = estimates.iter().find(|(ts, _)| *ts == bolus.timestamp) {
            bolus.estimate = Some(wizard.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pumphist_types::{
        BolusDto, BolusWizardDto, DailyTotalsDto, DeviceTimestamp, Payload, TempBasalPair,
    };
    use time::macros::date;

    fn entry(entry_type: EntryType, raw: u64, pump_id: u64) -> HistoryEntry {
        HistoryEntry::new(entry_type, DeviceTimestamp::from_raw(raw), pump_id)
    }

    fn filter() -> BatchFilter {
        BatchFilter::new(date!(2026-10-16))
    }

    #[test]
    fn test_known_entries_are_dropped() {
        let known = entry(EntryType::Suspend, 20261016080000, 1);
        let fresh = entry(EntryType::Resume, 20261016083000, 2);
        let window = HistoryWindow::from_entries([known.clone()]);

        let events = filter().filter(&[known, fresh], &window);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pump_id, 2);
    }

    #[test]
    fn test_output_is_sorted() {
        let batch = [
            entry(EntryType::Resume, 20261016090000, 3),
            entry(EntryType::Suspend, 20261016080000, 1),
            entry(EntryType::Unknown(0x5c), 20261016085000, 2),
        ];
        let ids: Vec<u64> = filter()
            .filter(&batch, &HistoryWindow::new())
            .iter()
            .map(|e| e.pump_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_same_day_end_result_totals_held_back() {
        let totals = Payload::DailyTotals(DailyTotalsDto {
            total_insulin: 30.0,
            basal_insulin: 15.0,
            bolus_insulin: 15.0,
        });
        let batch = [
            entry(EntryType::EndResultTotals, 20261016000000, 1).with_payload(totals.clone()),
            entry(EntryType::EndResultTotals, 20261015000000, 2).with_payload(totals),
        ];
        let events = filter().filter(&batch, &HistoryWindow::new());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pump_id, 2);
    }

    #[test]
    fn test_wizard_estimate_attached_to_bolus() {
        let wizard = BolusWizardDto {
            carbs: 45.0,
            bolus_estimate: 4.5,
            ..Default::default()
        };
        let batch = [
            entry(EntryType::BolusWizardEstimate, 20261016120000, 1)
                .with_payload(Payload::BolusWizard(wizard.clone())),
            entry(EntryType::Bolus, 20261016120000, 2)
                .with_payload(Payload::Bolus(BolusDto::normal(4.5))),
            entry(EntryType::Bolus, 20261016130000, 3)
                .with_payload(Payload::Bolus(BolusDto::normal(1.0))),
        ];
        let events = filter().filter(&batch, &HistoryWindow::new());

        assert_eq!(events.len(), 3);
        let bolus = events.iter().find(|e| e.pump_id == 2).unwrap();
        assert_eq!(bolus.estimate.as_ref(), Some(&wizard));
        let other = events.iter().find(|e| e.pump_id == 3).unwrap();
        assert!(other.estimate.is_none());
    }

    #[test]
    fn test_temp_basal_halves_replaced_by_combined() {
        let rate = entry(EntryType::TempBasalRate, 20261016100000, 10).with_payload(
            Payload::TempBasal(TempBasalPair {
                insulin_rate: 80.0,
                duration_minutes: 0,
                is_percent: true,
            }),
        );
        let duration = entry(EntryType::TempBasalDuration, 20261016100000, 11).with_payload(
            Payload::TempBasal(TempBasalPair {
                insulin_rate: 0.0,
                duration_minutes: 60,
                is_percent: false,
            }),
        );

        let events = filter().filter(&[rate, duration], &HistoryWindow::new());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].entry_type, EntryType::TempBasalCombined);
        assert_eq!(events[0].pump_id, 10);

        // Known combined entry: re-delivered halves yield nothing new.
        let window = HistoryWindow::from_entries(events.clone());
        let rate = entry(EntryType::TempBasalRate, 20261016100000, 10).with_payload(
            Payload::TempBasal(TempBasalPair {
                insulin_rate: 80.0,
                duration_minutes: 0,
                is_percent: true,
            }),
        );
        let duration = entry(EntryType::TempBasalDuration, 20261016100000, 11).with_payload(
            Payload::TempBasal(TempBasalPair {
                insulin_rate: 0.0,
                duration_minutes: 60,
                is_percent: false,
            }),
        );
        assert!(filter().filter(&[rate, duration], &window).is_empty());
    }
}
