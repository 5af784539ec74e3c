//! Detection of pump state and settings changes in history.

use tracing::debug;

use pumphist_types::{BasalProfile, EntryType, HistoryEntry};

use crate::window::HistoryWindow;

/// Entry types that tell whether the pump is currently delivering.
const DELIVERY_STATE_TYPES: [EntryType; 8] = [
    EntryType::Bolus,
    EntryType::TempBasalCombined,
    EntryType::Prime,
    EntryType::Suspend,
    EntryType::Resume,
    EntryType::Rewind,
    EntryType::NoDeliveryAlarm,
    EntryType::BasalProfileStart,
];

const DELIVERING_TYPES: [EntryType; 5] = [
    EntryType::TempBasalCombined,
    EntryType::BasalProfileStart,
    EntryType::Bolus,
    EntryType::Resume,
    EntryType::Prime,
];

const CLOCK_CHANGE_TYPES: [EntryType; 2] = [EntryType::NewTimeSet, EntryType::ChangeTime];

const CONFIG_CHANGE_TYPES: [EntryType; 6] = [
    EntryType::ChangeBasalPattern,
    EntryType::ClearSettings,
    EntryType::SaveSettings,
    EntryType::ChangeMaxBolus,
    EntryType::ChangeMaxBasal,
    EntryType::ChangeTempBasalType,
];

/// Whether the newest delivery-related entry says the pump is stopped.
///
/// Looks at the window and the new events together. Without any relevant
/// entry the pump is assumed to be delivering.
pub fn pump_is_suspended(window: &HistoryWindow, new_events: &[HistoryEntry]) -> bool {
    let newest = window
        .iter()
        .chain(new_events.iter())
        .filter(|e| e.is_any_of(&DELIVERY_STATE_TYPES))
        .max_by_key(|e| e.timestamp);

    match newest {
        Some(entry) => {
            let suspended = !entry.is_any_of(&DELIVERING_TYPES);
            debug!("Pump suspended={} [newest={}]", suspended, entry);
            suspended
        }
        None => false,
    }
}

/// Whether a new basal profile was stored on the pump.
pub fn basal_profile_changed(new_events: &[HistoryEntry]) -> bool {
    new_events
        .iter()
        .any(|e| e.entry_type == EntryType::ChangeBasalProfileNewProfile)
}

/// Whether the pump clock was set.
pub fn pump_clock_changed(new_events: &[HistoryEntry]) -> bool {
    new_events.iter().any(|e| e.is_any_of(&CLOCK_CHANGE_TYPES))
}

/// Whether a setting the driver depends on was changed on the pump.
pub fn relevant_config_changed(new_events: &[HistoryEntry]) -> bool {
    new_events.iter().any(|e| e.is_any_of(&CONFIG_CHANGE_TYPES))
}

/// Profile stored by the newest basal profile change.
pub fn latest_known_profile(new_events: &[HistoryEntry]) -> Option<&BasalProfile> {
    new_events
        .iter()
        .filter(|e| e.entry_type == EntryType::ChangeBasalProfileNewProfile)
        .max_by_key(|e| e.timestamp)
        .and_then(|e| e.payload.as_basal_profile())
}
