//! Command-line interface for insulin pump history reconciliation.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `replay` | Reconcile batch files in order |
//! | `watch` | Reconcile batch files dropped into a spool directory |
//! | `records` | List stored records |
//! | `status` | Window size, latest entry, pump state |
//! | `config` | Manage CLI configuration |
//! | `completions` | Generate shell completions |
//!
//! # Configuration
//!
//! The CLI stores configuration in `~/.config/pumphist/config.toml` (or
//! platform equivalent): database path, pump model, spool directory, poll
//! interval and the number of startup cycles.
//!
//! # Environment Variables
//!
//! - `PUMPHIST_DB`: Database file (overridden by `--db`)
//! - `NO_COLOR`: Disable colored output when set
//! - `RUST_LOG`: Log filter when neither `--verbose` nor `--quiet` is given

mod batch;
mod cli;
mod commands;
mod config;
mod format;
mod session;

use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{
    RecordsArgs, ReplayArgs, WatchArgs, cmd_config, cmd_records, cmd_replay, cmd_status,
    cmd_watch,
};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "pumphist", &mut io::stdout());
        return Ok(());
    }

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = Config::load();
    let db = config.database_path(cli.db.as_deref());

    match cli.command {
        Commands::Replay {
            files,
            init,
            format,
        } => cmd_replay(
            ReplayArgs {
                files: &files,
                init,
                format,
                db: &db,
                no_color: cli.no_color,
            },
            &config,
        ),
        Commands::Watch {
            spool,
            interval,
            format,
        } => {
            let spool = config.spool_path(spool.as_deref());
            cmd_watch(
                WatchArgs {
                    spool: &spool,
                    interval: interval.unwrap_or(config.poll_interval),
                    format,
                    db: &db,
                    no_color: cli.no_color,
                },
                &config,
            )
            .await
        }
        Commands::Records {
            category,
            since,
            limit,
            format,
        } => cmd_records(RecordsArgs {
            category,
            since: since.as_deref(),
            limit,
            format,
            db: &db,
        }),
        Commands::Status { format } => cmd_status(&db, format, cli.no_color),
        Commands::Config { action } => cmd_config(action, &config),
        Commands::Completions { .. } => Ok(()),
    }
}
