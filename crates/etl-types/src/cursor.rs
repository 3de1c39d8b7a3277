//! Change-stream cursors.
//!
//! A cursor is the `(timestamp, id)` boundary of everything already
//! processed in one stream. Cursors are totally ordered by timestamp,
//! then id, with "no id" sorting before any id.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Position in a change stream.
///
/// Serialized as a two-element JSON array `[timestamp, id]`, where the id
/// is `null` for a stream that has never seen a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(DateTime<Utc>, Option<String>)", into = "(DateTime<Utc>, Option<String>)")]
pub struct Cursor {
    /// Modification timestamp of the last processed row
    pub timestamp: DateTime<Utc>,
    /// Id of the last processed row, tie-break for equal timestamps
    pub id: Option<String>,
}

impl Cursor {
    /// Create a cursor pointing at a concrete row.
    pub fn new(timestamp: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self {
            timestamp,
            id: Some(id.into()),
        }
    }

    /// The cursor of a stream that has never run.
    ///
    /// Uses 0001-01-01T00:00:00Z rather than chrono's minimum so the value
    /// stays inside PostgreSQL's `timestamptz` range when bound to a query.
    pub fn initial() -> Self {
        let timestamp = NaiveDate::from_ymd_opt(1, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Self {
            timestamp,
            id: None,
        }
    }

    /// True if this cursor was never advanced past the initial position.
    pub fn is_initial(&self) -> bool {
        self.id.is_none() && *self == Self::initial()
    }

    /// True if the given row is exactly the row this cursor points at.
    pub fn points_at(&self, timestamp: &DateTime<Utc>, id: &str) -> bool {
        self.timestamp == *timestamp && self.id.as_deref() == Some(id)
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::initial()
    }
}

impl Ord for Cursor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<(DateTime<Utc>, Option<String>)> for Cursor {
    fn from((timestamp, id): (DateTime<Utc>, Option<String>)) -> Self {
        Self { timestamp, id }
    }
}

impl From<Cursor> for (DateTime<Utc>, Option<String>) {
    fn from(cursor: Cursor) -> Self {
        (cursor.timestamp, cursor.id)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "({}, {})", self.timestamp.to_rfc3339(), id),
            None => write!(f, "({}, -)", self.timestamp.to_rfc3339()),
        }
    }
}
