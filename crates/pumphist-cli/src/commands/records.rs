//! Records command: list what the store holds.

use std::path::Path;

use anyhow::{Context, Result, bail};
use time::{Date, PrimitiveDateTime};
use time::macros::format_description;

use pumphist_store::{RecordQuery, Store};

use crate::cli::{OutputFormat, RecordCategory};
use crate::format::{
    format_boluses_text, format_daily_totals_text, format_extended_boluses_text, format_json,
    format_temp_rates_text,
};

/// Arguments for the records command.
pub struct RecordsArgs<'a> {
    pub category: RecordCategory,
    pub since: Option<&'a str>,
    pub limit: u32,
    pub format: OutputFormat,
    pub db: &'a Path,
}

pub fn cmd_records(args: RecordsArgs<'_>) -> Result<()> {
    let store = Store::open(args.db)
        .with_context(|| format!("Failed to open database: {}", args.db.display()))?;

    let mut query = RecordQuery::new();
    if args.limit > 0 {
        query = query.limit(args.limit);
    }
    if let Some(since) = args.since {
        query = query.since(parse_local_time(since)?);
    }

    let json = args.format == OutputFormat::Json;
    let content = match args.category {
        RecordCategory::Bolus => {
            let records = store.query_boluses(&query)?;
            if json {
                format_json(&records)?
            } else {
                format_boluses_text(&records)
            }
        }
        RecordCategory::Extended => {
            let records = store.query_extended_boluses(&query)?;
            if json {
                format_json(&records)?
            } else {
                format_extended_boluses_text(&records)
            }
        }
        RecordCategory::TempRate => {
            let records = store.query_temp_rates(&query)?;
            if json {
                format_json(&records)?
            } else {
                format_temp_rates_text(&records)
            }
        }
        RecordCategory::Totals => {
            let records = store.query_daily_totals(&query)?;
            if json {
                format_json(&records)?
            } else {
                format_daily_totals_text(&records)
            }
        }
    };

    print!("{}", content);
    Ok(())
}

/// Parse `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD` as a
/// local wall-clock time.
fn parse_local_time(s: &str) -> Result<PrimitiveDateTime> {
    let with_t = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let with_space = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let date_only = format_description!("[year]-[month]-[day]");

    if let Ok(dt) = PrimitiveDateTime::parse(s, with_t) {
        return Ok(dt);
    }
    if let Ok(dt) = PrimitiveDateTime::parse(s, with_space) {
        return Ok(dt);
    }
    if let Ok(date) = Date::parse(s, date_only) {
        return Ok(date.midnight());
    }

    bail!(
        "Invalid date/time format: {}. Use YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS",
        s
    )
}
