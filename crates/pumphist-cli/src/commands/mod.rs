//! Command implementations for the CLI.

mod config;
mod records;
mod replay;
mod status;
mod watch;

pub use config::cmd_config;
pub use records::{RecordsArgs, cmd_records};
pub use replay::{ReplayArgs, cmd_replay};
pub use status::cmd_status;
pub use watch::{WatchArgs, cmd_watch};
