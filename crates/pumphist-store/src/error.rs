//! Error types for pumphist-store.

use std::path::PathBuf;

/// Result type for pumphist-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pumphist-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A stored timestamp is out of range.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Window snapshot could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
