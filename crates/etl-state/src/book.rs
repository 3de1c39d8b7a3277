//! In-memory cursor book.
//!
//! The book is loaded from the store once at process start and is the only
//! copy the pipelines read. Every advance commits the whole map back to the
//! store before the in-memory copy changes, so a failed commit leaves both
//! sides at the previous value.

use std::sync::Arc;

use etl_types::Cursor;
use tracing::{debug, info};

use crate::error::StateError;
use crate::store::{CursorMap, CursorStore};

pub struct CursorBook {
    store: Arc<dyn CursorStore>,
    cursors: CursorMap,
}

impl CursorBook {
    /// Load the persisted map from `store`.
    pub fn open(store: Arc<dyn CursorStore>) -> Result<Self, StateError> {
        let cursors = store.load()?;
        info!(streams = cursors.len(), "Cursor book opened");
        Ok(Self { store, cursors })
    }

    /// Record `streams` that have never run as fresh (`None`) entries.
    ///
    /// Only the in-memory map changes; fresh entries reach the store with the
    /// next commit.
    pub fn register<'a>(&mut self, streams: impl IntoIterator<Item = &'a str>) {
        for stream in streams {
            if !self.cursors.contains_key(stream) {
                debug!(stream = %stream, "Registering fresh stream");
                self.cursors.insert(stream.to_string(), None);
            }
        }
    }

    /// Current cursor for `stream`, the initial cursor when it never committed.
    pub fn get(&self, stream: &str) -> Cursor {
        self.cursors
            .get(stream)
            .cloned()
            .flatten()
            .unwrap_or_else(Cursor::initial)
    }

    /// Move `stream` to `cursor` and persist the whole map.
    ///
    /// Returns `Ok(false)` without touching the store when the cursor is
    /// unchanged. A cursor older than the current one is rejected.
    pub fn advance_and_commit(&mut self, stream: &str, cursor: Cursor) -> Result<bool, StateError> {
        let current = self.get(stream);
        if cursor < current {
            return Err(StateError::Regression {
                stream: stream.to_string(),
                current,
                proposed: cursor,
            });
        }
        if cursor == current && self.cursors.contains_key(stream) {
            return Ok(false);
        }

        let mut next = self.cursors.clone();
        next.insert(stream.to_string(), Some(cursor.clone()));
        self.store.commit(&next)?;
        self.cursors = next;

        info!(stream = %stream, cursor = %cursor, "Cursor committed");
        Ok(true)
    }

    /// Every known stream and its cursor.
    pub fn snapshot(&self) -> &CursorMap {
        &self.cursors
    }
}
