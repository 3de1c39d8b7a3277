//! Change sources.
//!
//! A change source answers three kinds of request for the extraction
//! workers: paginated scans of one change stream, point lookups that
//! rehydrate aggregates by id, and the "current maximum" probe used when a
//! stream has nothing new.

mod postgres;
pub mod queries;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use etl_types::Cursor;

use crate::error::SourceError;

pub use postgres::PostgresSource;

/// Source tables that carry a `modified` timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    FilmWork,
    Person,
    Genre,
    Mark,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::FilmWork => "film_work",
            Entity::Person => "person",
            Entity::Genre => "genre",
            Entity::Mark => "mark",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rows a worker scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The entity's own rows: `entity.modified >= cursor`
    Root(Entity),
    /// Film works linked to a changed related entity, limited to those whose
    /// own `modified` is older than the related change and not after the
    /// root stream's cursor
    Related(Entity),
}

impl Selection {
    /// The table whose timestamps drive this stream.
    pub fn entity(&self) -> Entity {
        match self {
            Selection::Root(e) | Selection::Related(e) => *e,
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Root(e) => write!(f, "{}", e),
            Selection::Related(e) => write!(f, "film_work<-{}", e),
        }
    }
}

/// Aggregates the source can rehydrate by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    FilmWork,
    Person,
    Genre,
}

/// One row of a change stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRow {
    /// Aggregate root to rehydrate
    pub root_id: String,
    /// `modified` of the row that drives the stream
    pub timestamp: DateTime<Utc>,
    /// Id of the row that drives the stream
    pub id: String,
}

impl ChangeRow {
    pub fn new(root_id: impl Into<String>, timestamp: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self {
            root_id: root_id.into(),
            timestamp,
            id: id.into(),
        }
    }

    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.timestamp, self.id.clone())
    }
}

/// Read side of the pipeline.
///
/// At most one scan is open at a time. Opening a new scan discards any
/// scan left open by an aborted pass.
#[async_trait]
pub trait ChangeSource: Send {
    /// Start a scan of `selection` over rows at or after `from.timestamp`,
    /// ordered by `(timestamp, id, root_id)`.
    ///
    /// `root` is the root stream's cursor. A related scan only returns roots
    /// modified at or before its timestamp; newer roots are the root
    /// worker's. `None` leaves related scans unbounded.
    async fn open_scan(
        &mut self,
        selection: Selection,
        from: &Cursor,
        root: Option<&Cursor>,
    ) -> Result<(), SourceError>;

    /// Next rows of the open scan; empty once the scan is drained.
    async fn fetch(&mut self, max_rows: usize) -> Result<Vec<ChangeRow>, SourceError>;

    /// Release the open scan. A no-op when none is open.
    async fn close_scan(&mut self) -> Result<(), SourceError>;

    /// Greatest `(modified, id)` in the entity's table.
    ///
    /// While a scan is open this reads the scan's snapshot, so the answer
    /// never covers rows the scan could not see.
    async fn probe_max(&mut self, entity: Entity) -> Result<Option<Cursor>, SourceError>;

    /// Full aggregates for `ids`, one JSON object per id found.
    async fn enrich(
        &mut self,
        aggregate: Aggregate,
        ids: &[String],
    ) -> Result<Vec<serde_json::Value>, SourceError>;

    /// Single round trip proving the source is reachable.
    async fn ping(&mut self) -> Result<(), SourceError>;
}
