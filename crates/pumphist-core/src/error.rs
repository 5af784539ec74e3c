//! Error types for pumphist-core.
//!
//! The reconciliation cycle recovers locally from every data problem it can
//! meet (see the table below); only failures of the external collaborators
//! surface as [`Error`] values.
//!
//! | Condition | Recovery |
//! |-----------|----------|
//! | Malformed entry timestamp | Entry skipped from time-based work, 10 minute default lookback |
//! | Latest window timestamp undecodable | Trimming skipped for the cycle |
//! | Several records within the narrowest tolerance | Event inserted as new, warning logged |
//! | Pump-stop interval without a terminator | Interval deferred to a later cycle |
//! | Unknown entry type | Passed through untouched |
//! | Store failure | Returned as [`Error::Store`] |
//! | Clock source failure | Returned as [`Error::Clock`] |
//!
//! Store and clock calls may block on I/O. Timeouts belong to those
//! collaborators and should be reported through these variants.

use thiserror::Error;

use pumphist_types::ParseError;

/// Errors that can occur while reconciling pump history.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A timestamp or payload could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The therapy store failed.
    #[error("Store error during {operation}: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The clock source failed.
    #[error("Clock error: {0}")]
    Clock(String),

    /// Options are invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Wrap a store failure.
    pub fn store<E>(operation: &'static str, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Store {
            operation,
            source: source.into(),
        }
    }

    /// Create a clock error.
    pub fn clock(message: impl Into<String>) -> Self {
        Error::Clock(message.into())
    }
}

/// Result type alias using pumphist-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = Error::store("upsert", "disk full");
        assert_eq!(err.to_string(), "Store error during upsert: disk full");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = ParseError::InvalidTimestamp(42).into();
        assert!(matches!(err, Error::Parse(ParseError::InvalidTimestamp(42))));
    }

    #[test]
    fn test_clock_error_display() {
        assert_eq!(Error::clock("no answer").to_string(), "Clock error: no answer");
    }
}
