//! SQLite persistence for reconciled insulin pump history.
//!
//! This crate provides the therapy store and statistics sink the
//! reconciliation engine in `pumphist-core` writes to, plus a snapshot table
//! for the history window so a restarted process picks up where it left off.
//!
//! # Features
//!
//! - Boluses, extended boluses, temporary rates and daily totals
//! - Upsert by record id or pump-assigned id
//! - Latest reconciled entry statistic
//! - History window snapshot and restore
//! - Query by time range, with ordering and limits
//!
//! # Example
//!
//! ```no_run
//! use pumphist_store::{RecordQuery, Store};
//!
//! let store = Store::open_default()?;
//!
//! let recent = store.query_temp_rates(&RecordQuery::new().limit(10))?;
//! for rate in recent {
//!     println!("{} {} for {} min", rate.local_time, rate.rate, rate.duration_minutes);
//! }
//! # Ok::<(), pumphist_store::Error>(())
//! ```

mod error;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use queries::RecordQuery;
pub use store::{LAST_HISTORY_ENTRY_KEY, RecordCounts, Store};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/pumphist/history.db`
/// - macOS: `~/Library/Application Support/pumphist/history.db`
/// - Windows: `C:\Users\<user>\AppData\Local\pumphist\history.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("pumphist")
        .join("history.db")
}
