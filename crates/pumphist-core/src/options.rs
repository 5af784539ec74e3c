//! Tunables for history reconciliation.

use time::Duration;

use pumphist_types::{EntryType, PumpModel};

use crate::error::{Error, Result};

/// Options for [`PumpHistory`](crate::PumpHistory).
#[derive(Debug, Clone)]
pub struct HistoryOptions {
    /// How far back from the newest entry the window remembers entries.
    pub retention: Duration,
    /// Margin subtracted from the oldest entry when querying the store.
    pub lookback_margin: Duration,
    /// Query lookback from "now" when no entry timestamp is usable.
    pub default_lookback: Duration,
    /// Number of days of daily totals fetched for comparison.
    pub daily_totals_days: u32,
    /// Connected pump model; selects the daily totals entry type.
    pub pump_model: PumpModel,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            retention: Duration::hours(24),
            lookback_margin: Duration::minutes(5),
            default_lookback: Duration::minutes(10),
            daily_totals_days: 3,
            pump_model: PumpModel::Unknown,
        }
    }
}

impl HistoryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the window retention period.
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the margin applied to store query lower bounds.
    pub fn lookback_margin(mut self, margin: Duration) -> Self {
        self.lookback_margin = margin;
        self
    }

    /// Set the fallback query lookback.
    pub fn default_lookback(mut self, lookback: Duration) -> Self {
        self.default_lookback = lookback;
        self
    }

    /// Set how many days of daily totals are compared.
    pub fn daily_totals_days(mut self, days: u32) -> Self {
        self.daily_totals_days = days;
        self
    }

    /// Set the pump model.
    pub fn pump_model(mut self, model: PumpModel) -> Self {
        self.pump_model = model;
        self
    }

    /// Entry type carrying the model's own daily totals.
    pub fn daily_totals_type(&self) -> EntryType {
        self.pump_model.daily_totals_type()
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if !self.retention.is_positive() {
            return Err(Error::InvalidConfig("retention must be > 0".to_string()));
        }
        if self.lookback_margin.is_negative() {
            return Err(Error::InvalidConfig(
                "lookback_margin must be >= 0".to_string(),
            ));
        }
        if !self.default_lookback.is_positive() {
            return Err(Error::InvalidConfig(
                "default_lookback must be > 0".to_string(),
            ));
        }
        if self.daily_totals_days == 0 {
            return Err(Error::InvalidConfig(
                "daily_totals_days must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = HistoryOptions::default();
        assert_eq!(options.retention, Duration::hours(24));
        assert_eq!(options.lookback_margin, Duration::minutes(5));
        assert_eq!(options.default_lookback, Duration::minutes(10));
        assert_eq!(options.daily_totals_days, 3);
        assert_eq!(options.daily_totals_type(), EntryType::EndResultTotals);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let options = HistoryOptions::new()
            .retention(Duration::hours(12))
            .daily_totals_days(5)
            .pump_model(PumpModel::Mm523);
        assert_eq!(options.retention, Duration::hours(12));
        assert_eq!(options.daily_totals_days, 5);
        assert_eq!(options.daily_totals_type(), EntryType::DailyTotals523);
    }

    #[test]
    fn test_validate_rejects_zero_retention() {
        let options = HistoryOptions::new().retention(Duration::ZERO);
        assert!(matches!(options.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_days() {
        let options = HistoryOptions::new().daily_totals_days(0);
        assert!(options.validate().is_err());
    }
}
