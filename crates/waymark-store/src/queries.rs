//! Query builder for stored location events.
//!
//! [`RecordQuery`] follows the builder pattern for filtering and
//! paginating the event log.
//!
//! # Example
//!
//! ```
//! use waymark_store::{Store, RecordQuery};
//! use time::{Duration, OffsetDateTime};
//!
//! let store = Store::open_in_memory()?;
//! let yesterday = OffsetDateTime::now_utc() - Duration::hours(24);
//!
//! let query = RecordQuery::new().since(yesterday).limit(50);
//! let records = store.query_records(&query)?;
//! # Ok::<(), waymark_store::Error>(())
//! ```

use time::OffsetDateTime;

/// Fluent query builder for stored location events.
///
/// Use this to construct queries for
/// [`Store::query_records`](crate::Store::query_records). All filter
/// methods are optional and can be chained in any order.
///
/// By default, queries return results ordered by `captured_at` descending
/// (newest first).
#[derive(Debug, Default, Clone)]
pub struct RecordQuery {
    /// Only include records not yet confirmed by the remote store.
    pub pending_only: bool,
    /// Filter records captured at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Filter records captured at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by captured_at descending (newest first).
    pub newest_first: bool,
}

impl RecordQuery {
    /// Create a new query with default settings.
    ///
    /// Default behavior:
    /// - No pending filter (all records)
    /// - No time range filter
    /// - No limit (all matching records)
    /// - Ordered by newest first
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Only include records awaiting remote confirmation.
    pub fn pending_only(mut self) -> Self {
        self.pending_only = true;
        self
    }

    /// Filter to records captured at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to records captured at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    ///
    /// Use with `limit()` for pagination.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results by oldest first (ascending by `captured_at`).
    ///
    /// The secondary sort key is the record id, so the order is stable
    /// even for events captured within the same millisecond.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if self.pending_only {
            conditions.push("synced = 0");
        }

        if let Some(since) = self.since {
            conditions.push("captured_at >= ?");
            params.push(Box::new(unix_millis(since)));
        }

        if let Some(until) = self.until {
            conditions.push("captured_at <= ?");
            params.push(Box::new(unix_millis(until)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, lat, lng, rssi, status, address, raw, captured_at, \
             origin, synced, remote_id \
             FROM events {} ORDER BY captured_at {}, id {}",
            where_clause, order, order
        );

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql
    }
}

/// Unix timestamp in milliseconds, the storage resolution for capture times.
pub(crate) fn unix_millis(time: OffsetDateTime) -> i64 {
    (time.unix_timestamp_nanos() / 1_000_000) as i64
}
