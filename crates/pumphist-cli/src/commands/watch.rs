//! Watch command implementation.
//!
//! Polls a spool directory for batch files. Each `*.json` file is reconciled
//! in name order and renamed to `*.done`; files that cannot be read or
//! parsed are renamed to `*.failed` so they are not retried forever. If the
//! store fails mid-cycle the batch stays pending in the engine and is
//! retried together with the next file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::batch::BatchFile;
use crate::cli::OutputFormat;
use crate::config::Config;
use crate::format::{format_cycle_text, format_json};
use crate::session::Session;

/// Arguments for the watch command.
pub struct WatchArgs<'a> {
    pub spool: &'a Path,
    pub interval: u64,
    pub format: OutputFormat,
    pub db: &'a Path,
    pub no_color: bool,
}

pub async fn cmd_watch(args: WatchArgs<'_>, config: &Config) -> Result<()> {
    let WatchArgs {
        spool,
        interval,
        format,
        db,
        no_color,
    } = args;

    fs::create_dir_all(spool)
        .with_context(|| format!("Failed to create spool directory: {}", spool.display()))?;
    let mut session = Session::open(db, config.history_options()?, config.init_cycles)?;

    let spool_display = if no_color {
        spool.display().to_string()
    } else {
        spool.display().cyan().to_string()
    };
    eprintln!("Watching: {}", spool_display);
    eprintln!("Interval: {}s | Press Ctrl+C to stop", interval);
    eprintln!("{}", "-".repeat(50));

    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let pending = match pending_batches(spool) {
            Ok(pending) => pending,
            Err(e) => {
                error!("Failed to list spool directory: {:#}", e);
                continue;
            }
        };

        for path in pending {
            process_file(&mut session, &path, format, no_color);
        }
    }
}

fn process_file(session: &mut Session, path: &Path, format: OutputFormat, no_color: bool) {
    let batch = match BatchFile::load(path) {
        Ok(batch) => batch,
        Err(e) => {
            error!("{:#}", e);
            mark(path, "failed");
            return;
        }
    };

    match session.run_batch(&path.display().to_string(), batch) {
        Ok(summary) => {
            let content = match format {
                OutputFormat::Text => Ok(format_cycle_text(&summary, no_color)),
                OutputFormat::Json => format_json(&summary),
            };
            match content {
                Ok(content) => print!("{}", content),
                Err(e) => warn!("Failed to format cycle summary: {}", e),
            }
            mark(path, "done");
        }
        Err(e) => {
            error!("{:#}", e);
            mark(path, "failed");
        }
    }
}

/// `*.json` files in `dir`, sorted by name.
pub(crate) fn pending_batches(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn mark(path: &Path, suffix: &str) {
    let target = path.with_extension(suffix);
    match fs::rename(path, &target) {
        Ok(()) => info!("Moved {} to {}", path.display(), target.display()),
        Err(e) => error!("Failed to rename {}: {}", path.display(), e),
    }
}
