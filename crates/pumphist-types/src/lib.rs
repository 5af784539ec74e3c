//! Platform-agnostic types for insulin pump history reconciliation.
//!
//! This crate provides the shared vocabulary used by the reconciliation
//! engine (pumphist-core), its SQLite store (pumphist-store) and the
//! command-line tool (pumphist-cli).
//!
//! # Features
//!
//! - Packed pump timestamps ([`DeviceTimestamp`]) with fallible decoding
//! - Decoded history entries ([`HistoryEntry`]) and their typed payloads
//! - Clock offset snapshots ([`ClockOffset`])
//! - Therapy records as kept by the persistent store
//!
//! # Example
//!
//! ```
//! use pumphist_types::{BolusDto, DeviceTimestamp, EntryType, HistoryEntry, Payload};
//!
//! let entry = HistoryEntry::new(EntryType::Bolus, DeviceTimestamp::from_raw(20261016101500), 7)
//!     .with_payload(Payload::Bolus(BolusDto::normal(2.5)));
//! assert!(entry.same_record(&entry.clone()));
//! ```

pub mod error;
pub mod records;
pub mod timestamp;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use records::{
    BolusRecord, DailyTotalRecord, ExtendedBolusRecord, RecordKind, RecordLink, RecordSource,
    TempRateRecord, TherapyRecord, Timestamped,
};
pub use timestamp::DeviceTimestamp;
pub use types::{
    BasalProfile, BasalRate, BolusDto, BolusType, BolusWizardDto, ClockOffset, DailyTotalsDto,
    EntryType, HistoryEntry, Payload, PumpModel, TempBasalPair,
};
