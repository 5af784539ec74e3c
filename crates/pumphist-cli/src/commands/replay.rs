//! Replay command: one reconciliation cycle per batch file.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::format::{format_cycle_text, format_json};
use crate::session::{CycleSummary, Session};

/// Arguments for the replay command.
pub struct ReplayArgs<'a> {
    pub files: &'a [PathBuf],
    pub init: bool,
    pub format: OutputFormat,
    pub db: &'a Path,
    pub no_color: bool,
}

pub fn cmd_replay(args: ReplayArgs<'_>, config: &Config) -> Result<()> {
    let ReplayArgs {
        files,
        init,
        format,
        db,
        no_color,
    } = args;

    let init_cycles = if init { config.init_cycles.max(1) } else { 0 };
    let mut session = Session::open(db, config.history_options()?, init_cycles)?;

    let mut summaries: Vec<CycleSummary> = Vec::with_capacity(files.len());
    for path in files {
        let summary = session.run_file(path)?;
        if format == OutputFormat::Text {
            print!("{}", format_cycle_text(&summary, no_color));
        }
        summaries.push(summary);
    }

    if format == OutputFormat::Json {
        print!("{}", format_json(&summaries)?);
    }

    Ok(())
}
