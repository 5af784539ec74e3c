//! Output formatting.

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use time::PrimitiveDateTime;

use pumphist_core::CategoryReport;
use pumphist_types::{BolusRecord, DailyTotalRecord, ExtendedBolusRecord, TempRateRecord};

use crate::session::CycleSummary;

/// Serialize any value as pretty JSON, newline terminated.
pub fn format_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(format!("{}\n", serde_json::to_string_pretty(value)?))
}

fn category_line(name: &str, report: &CategoryReport) -> Option<String> {
    if report.written() == 0 && report.skipped == 0 {
        return None;
    }
    let mut line = format!(
        "  {:<16} {} inserted, {} updated",
        name, report.inserted, report.updated
    );
    if report.skipped > 0 {
        line.push_str(&format!(", {} skipped", report.skipped));
    }
    line.push('\n');
    Some(line)
}

fn flag(label: &str, set: bool, no_color: bool) -> String {
    if !set {
        String::new()
    } else if no_color {
        format!(" [{}]", label)
    } else {
        format!(" [{}]", label.yellow())
    }
}

/// Human-readable summary of one cycle.
#[must_use]
pub fn format_cycle_text(summary: &CycleSummary, no_color: bool) -> String {
    let report = &summary.report;
    let source = if no_color {
        summary.source.clone()
    } else {
        summary.source.cyan().to_string()
    };

    let mut out = format!(
        "{}: {} new entries, {} events, {} records written{}\n",
        source,
        summary.added,
        report.events,
        report.records_written(),
        flag("init", summary.init, no_color),
    );

    let categories = [
        ("boluses", &report.boluses),
        ("extended boluses", &report.extended_boluses),
        ("temp rates", &report.temp_rates),
        ("pump stops", &report.pump_stops),
        ("daily totals", &report.daily_totals),
    ];
    for (name, category) in categories {
        if let Some(line) = category_line(name, category) {
            out.push_str(&line);
        }
    }

    if report.ambiguous_matches > 0 {
        let line = format!(
            "  {} ambiguous match(es) inserted as new records",
            report.ambiguous_matches
        );
        if no_color {
            out.push_str(&line);
        } else {
            out.push_str(&line.yellow().to_string());
        }
        out.push('\n');
    }

    let signals = summary.signals;
    out.push_str(&format!(
        "  window {} entries (trimmed {}){}{}{}{}\n",
        summary.window_size,
        summary.trimmed,
        flag("suspended", signals.pump_suspended, no_color),
        flag("basal profile changed", signals.basal_profile_changed, no_color),
        flag("clock changed", signals.pump_clock_changed, no_color),
        flag("settings changed", signals.relevant_config_changed, no_color),
    ));

    out
}

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Pump ID")]
    pump_id: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Details")]
    details: String,
}

fn format_time(time: PrimitiveDateTime) -> String {
    format!(
        "{} {:02}:{:02}:{:02}",
        time.date(),
        time.hour(),
        time.minute(),
        time.second()
    )
}

fn format_pump_id(pump_id: u64) -> String {
    if pump_id == 0 {
        "-".to_string()
    } else {
        pump_id.to_string()
    }
}

fn render(rows: Vec<RecordRow>, empty: &str) -> String {
    if rows.is_empty() {
        return format!("{}\n", empty);
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    format!("{}\n", table)
}

#[must_use]
pub fn format_boluses_text(records: &[BolusRecord]) -> String {
    let rows = records
        .iter()
        .map(|r| RecordRow {
            time: format_time(r.local_time),
            source: r.source.as_str().to_string(),
            pump_id: format_pump_id(r.pump_id),
            amount: format!("{:.2} U", r.insulin),
            details: if r.carbs > 0.0 {
                format!("{:.0} g carbs", r.carbs)
            } else {
                String::new()
            },
        })
        .collect();
    render(rows, "No boluses stored.")
}

#[must_use]
pub fn format_extended_boluses_text(records: &[ExtendedBolusRecord]) -> String {
    let rows = records
        .iter()
        .map(|r| RecordRow {
            time: format_time(r.local_time),
            source: r.source.as_str().to_string(),
            pump_id: format_pump_id(r.pump_id),
            amount: format!("{:.2} U", r.insulin),
            details: format!("over {} min", r.duration_minutes),
        })
        .collect();
    render(rows, "No extended boluses stored.")
}

#[must_use]
pub fn format_temp_rates_text(records: &[TempRateRecord]) -> String {
    let rows = records
        .iter()
        .map(|r| RecordRow {
            time: format_time(r.local_time),
            source: r.source.as_str().to_string(),
            pump_id: format_pump_id(r.pump_id),
            amount: if r.is_absolute {
                format!("{:.3} U/h", r.rate)
            } else {
                format!("{:.0} %", r.rate)
            },
            details: if r.is_absolute && r.rate == 0.0 {
                format!("{} min, pump stop", r.duration_minutes)
            } else {
                format!("{} min", r.duration_minutes)
            },
        })
        .collect();
    render(rows, "No temporary rates stored.")
}

#[must_use]
pub fn format_daily_totals_text(records: &[DailyTotalRecord]) -> String {
    let rows = records
        .iter()
        .map(|r| RecordRow {
            time: r.day.to_string(),
            source: "pump".to_string(),
            pump_id: "-".to_string(),
            amount: format!("{:.2} U", r.total_insulin),
            details: format!(
                "basal {:.2} U, bolus {:.2} U",
                r.basal_insulin, r.bolus_insulin
            ),
        })
        .collect();
    render(rows, "No daily totals stored.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Signals;
    use pumphist_core::CycleReport;
    use pumphist_types::RecordSource;
    use time::macros::{date, datetime};

    fn summary() -> CycleSummary {
        CycleSummary {
            source: "batch-01.json".to_string(),
            added: 4,
            init: false,
            report: CycleReport {
                events: 3,
                boluses: CategoryReport {
                    inserted: 1,
                    updated: 1,
                    skipped: 0,
                },
                ambiguous_matches: 1,
                ..Default::default()
            },
            signals: Signals {
                pump_suspended: true,
                ..Default::default()
            },
            trimmed: 2,
            window_size: 10,
            latest_entry: None,
        }
    }

    #[test]
    fn test_cycle_text() {
        let text = format_cycle_text(&summary(), true);
        assert!(text.starts_with("batch-01.json: 4 new entries, 3 events, 2 records written\n"));
        assert!(text.contains("boluses"));
        assert!(!text.contains("temp rates"));
        assert!(text.contains("1 ambiguous match(es)"));
        assert!(text.contains("window 10 entries (trimmed 2) [suspended]"));
    }

    #[test]
    fn test_cycle_json() {
        let json = format_json(&summary()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["report"]["boluses"]["inserted"], 1);
        assert_eq!(value["signals"]["pump_suspended"], true);
    }

    #[test]
    fn test_empty_records() {
        assert_eq!(format_boluses_text(&[]), "No boluses stored.\n");
        assert_eq!(format_daily_totals_text(&[]), "No daily totals stored.\n");
    }

    #[test]
    fn test_pump_stop_row() {
        let text = format_temp_rates_text(&[TempRateRecord {
            id: 1,
            local_time: datetime!(2026-10-16 11:00:00),
            source: RecordSource::Pump,
            pump_id: 42,
            rate: 0.0,
            duration_minutes: 30,
            is_absolute: true,
        }]);
        assert!(text.contains("2026-10-16 11:00:00"));
        assert!(text.contains("30 min, pump stop"));
        assert!(text.contains("42"));
    }

    #[test]
    fn test_daily_totals_row() {
        let text = format_daily_totals_text(&[DailyTotalRecord {
            id: 1,
            day: date!(2026-10-15),
            total_insulin: 40.0,
            basal_insulin: 18.5,
            bolus_insulin: 21.5,
        }]);
        assert!(text.contains("2026-10-15"));
        assert!(text.contains("40.00 U"));
        assert!(text.contains("basal 18.50 U, bolus 21.50 U"));
    }
}
