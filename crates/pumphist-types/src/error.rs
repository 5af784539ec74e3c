//! Error types for data decoding in pumphist-types.

use thiserror::Error;

/// Errors that can occur when interpreting decoded pump history data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The packed pump timestamp does not denote a valid date-time.
    #[error("Invalid pump timestamp: {0}")]
    InvalidTimestamp(u64),

    /// Data is structurally invalid.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using pumphist-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
