//! Query builder for stored therapy records.
//!
//! # Example
//!
//! ```
//! use pumphist_store::{RecordQuery, Store};
//! use time::macros::datetime;
//!
//! let store = Store::open_in_memory()?;
//!
//! let query = RecordQuery::new()
//!     .since(datetime!(2026-10-16 00:00:00))
//!     .limit(20);
//! let boluses = store.query_boluses(&query)?;
//! assert!(boluses.is_empty());
//! # Ok::<(), pumphist_store::Error>(())
//! ```

use time::PrimitiveDateTime;

use crate::store::{julian_day, local_seconds};

/// Fluent query builder for records.
///
/// By default results are ordered newest first. For daily totals the time
/// bounds apply to the calendar day.
#[derive(Debug, Default, Clone)]
pub struct RecordQuery {
    /// Records at or after this local time.
    pub since: Option<PrimitiveDateTime>,
    /// Records at or before this local time.
    pub until: Option<PrimitiveDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Order by time descending.
    pub newest_first: bool,
}

impl RecordQuery {
    /// Create a new query: no bounds, no limit, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Only records at or after `time`.
    pub fn since(mut self, time: PrimitiveDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Only records at or before `time`.
    pub fn until(mut self, time: PrimitiveDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Order results oldest first.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the WHERE clause and parameters for a local-time column.
    pub(crate) fn build_where_time(&self) -> (String, Vec<i64>) {
        self.build_where("local_time", local_seconds)
    }

    /// Build the WHERE clause and parameters for the daily totals day column.
    pub(crate) fn build_where_day(&self) -> (String, Vec<i64>) {
        self.build_where("day", |t| i64::from(julian_day(t.date())))
    }

    fn build_where(
        &self,
        column: &str,
        convert: impl Fn(PrimitiveDateTime) -> i64,
    ) -> (String, Vec<i64>) {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if let Some(since) = self.since {
            conditions.push(format!("{} >= ?", column));
            params.push(convert(since));
        }

        if let Some(until) = self.until {
            conditions.push(format!("{} <= ?", column));
            params.push(convert(until));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// ORDER BY and LIMIT suffix.
    pub(crate) fn build_suffix(&self, column: &str) -> String {
        let order = if self.newest_first { "DESC" } else { "ASC" };
        let mut suffix = format!("ORDER BY {} {}, id {}", column, order, order);

        if let Some(limit) = self.limit {
            suffix.push_str(&format!(" LIMIT {}", limit));
        }

        suffix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_default_query() {
        let query = RecordQuery::new();
        assert!(query.newest_first);
        let (where_clause, params) = query.build_where_time();
        assert!(where_clause.is_empty());
        assert!(params.is_empty());
        assert_eq!(query.build_suffix("local_time"), "ORDER BY local_time DESC, id DESC");
    }

    #[test]
    fn test_time_bounds() {
        let query = RecordQuery::new()
            .since(datetime!(2026-10-16 00:00:00))
            .until(datetime!(2026-10-16 12:00:00));
        let (where_clause, params) = query.build_where_time();
        assert_eq!(where_clause, "WHERE local_time >= ? AND local_time <= ?");
        assert_eq!(params[1] - params[0], 12 * 3600);
    }

    #[test]
    fn test_day_bounds() {
        let query = RecordQuery::new().since(datetime!(2026-10-15 18:00:00));
        let (where_clause, params) = query.build_where_day();
        assert_eq!(where_clause, "WHERE day >= ?");
        assert_eq!(
            params[0],
            i64::from(time::macros::date!(2026-10-15).to_julian_day())
        );
    }

    #[test]
    fn test_oldest_first_with_limit() {
        let query = RecordQuery::new().oldest_first().limit(5);
        assert_eq!(query.build_suffix("day"), "ORDER BY day ASC, id ASC LIMIT 5");
    }
}
