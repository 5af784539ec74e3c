//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Stored record category
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordCategory {
    /// Instantaneous boluses
    Bolus,
    /// Extended and audio boluses
    Extended,
    /// Temporary basal rates and pump stops
    TempRate,
    /// Daily insulin totals
    Totals,
}

#[derive(Parser)]
#[command(name = "pumphist")]
#[command(author, version, about = "Insulin pump history reconciliation", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Database file (overrides config)
    #[arg(long, global = true, env = "PUMPHIST_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one reconciliation cycle per batch file, in order
    Replay {
        /// Batch files (JSON)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Treat the first cycles as the startup sync (no change detection)
        #[arg(long)]
        init: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Reconcile batch files dropped into a spool directory
    Watch {
        /// Spool directory (overrides config)
        #[arg(short, long)]
        spool: Option<PathBuf>,

        /// Polling interval in seconds (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List stored records
    Records {
        /// Record category
        #[arg(value_enum)]
        category: RecordCategory,

        /// Only records since this local time (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)
        #[arg(long)]
        since: Option<String>,

        /// Maximum number of records (0 for all)
        #[arg(short = 'n', long, default_value = "20")]
        limit: u32,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the history window and store state
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Configuration subcommands
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Show configuration file path
    Path,

    /// Show current configuration
    Show,

    /// Initialize default configuration
    Init,
}
