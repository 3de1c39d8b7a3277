//! Extraction workers.
//!
//! A worker walks one change stream from its stored cursor and yields pages
//! of enriched aggregates. Rows at or before the cursor the pass started
//! from were fully handled by an earlier committed pass and are skipped, so
//! a stream with no new rows yields nothing. Each emitted page moves the
//! in-memory cursor to the page's last row; the pipeline persists it once
//! all of the worker's batches verified.

use std::collections::HashSet;
use std::marker::PhantomData;

use etl_types::Cursor;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::SourceError;
use crate::source::{Aggregate, ChangeRow, ChangeSource, Selection};

/// Static description of a worker: its stream name and what it scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub stream: String,
    pub selection: Selection,
    /// Probe the table maximum when the scan returns no rows at all
    pub probe: bool,
}

impl WorkerSpec {
    /// Worker over the aggregate's own rows.
    pub fn root(stream: impl Into<String>, selection: Selection) -> Self {
        Self {
            stream: stream.into(),
            selection,
            probe: false,
        }
    }

    /// Worker over a related-entity kind, with the no-data probe enabled.
    pub fn related(stream: impl Into<String>, selection: Selection) -> Self {
        Self {
            stream: stream.into(),
            selection,
            probe: true,
        }
    }

    pub fn is_related(&self) -> bool {
        matches!(self.selection, Selection::Related(_))
    }
}

/// Why a worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    /// The scan returned no rows at all
    Empty,
    /// Rows came back but none were newer than the cursor
    CaughtUp,
    /// New rows were emitted and the scan ran out
    Exhausted,
}

/// One step of a worker.
#[derive(Debug)]
pub enum Page<R> {
    Records(Vec<R>),
    Done(DoneReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Scanning,
    Finished(DoneReason),
}

pub struct ExtractorWorker<R> {
    spec: WorkerSpec,
    aggregate: Aggregate,
    page_size: usize,
    /// Cursor the pass started from; rows at or before it are skipped
    start: Cursor,
    /// Root stream cursor bounding a related scan
    root: Option<Cursor>,
    cursor: Cursor,
    state: State,
    rows_seen: usize,
    emitted: usize,
    _record: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned> ExtractorWorker<R> {
    pub fn new(spec: WorkerSpec, aggregate: Aggregate, cursor: Cursor, page_size: usize) -> Self {
        Self {
            spec,
            aggregate,
            page_size: page_size.max(1),
            start: cursor.clone(),
            root: None,
            cursor,
            state: State::Idle,
            rows_seen: 0,
            emitted: 0,
            _record: PhantomData,
        }
    }

    /// Bound a related scan by the root stream's cursor.
    pub fn with_root_cursor(mut self, root: Cursor) -> Self {
        self.root = Some(root);
        self
    }

    pub fn spec(&self) -> &WorkerSpec {
        &self.spec
    }

    /// In-memory cursor: the last row of the last emitted page.
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// True if the cursor moved past where the pass started.
    pub fn advanced(&self) -> bool {
        self.cursor > self.start
    }

    /// Fetch, enrich and decode the next page.
    ///
    /// Returns `Page::Done` once the stream is exhausted; calling again
    /// after that keeps returning the same `Done`.
    pub async fn next_page(&mut self, source: &mut dyn ChangeSource) -> Result<Page<R>, SourceError> {
        loop {
            match self.state {
                State::Finished(reason) => return Ok(Page::Done(reason)),
                State::Idle => {
                    source
                        .open_scan(self.spec.selection, &self.start, self.root.as_ref())
                        .await?;
                    self.state = State::Scanning;
                }
                State::Scanning => {}
            }

            let rows = source.fetch(self.page_size).await?;
            let short_page = rows.len() < self.page_size;
            self.rows_seen += rows.len();

            let fresh: Vec<&ChangeRow> = rows
                .iter()
                .filter(|r| Cursor::new(r.timestamp, r.id.clone()) > self.start)
                .collect();

            if fresh.is_empty() {
                if !rows.is_empty() && !short_page {
                    // Full page of already-handled rows; newer ones may follow
                    continue;
                }
                return self.finish(source).await;
            }

            let mut seen = HashSet::new();
            let ids: Vec<String> = fresh
                .iter()
                .filter(|r| seen.insert(r.root_id.as_str()))
                .map(|r| r.root_id.clone())
                .collect();

            let docs = source.enrich(self.aggregate, &ids).await?;
            let records = docs
                .into_iter()
                .map(serde_json::from_value::<R>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| {
                    SourceError::Data(format!("stream '{}': malformed aggregate: {}", self.spec.stream, e))
                })?;

            if let Some(last) = fresh.last() {
                let next = last.cursor();
                if next > self.cursor {
                    self.cursor = next;
                }
            }
            self.emitted += records.len();

            debug!(
                stream = %self.spec.stream,
                rows = rows.len(),
                roots = ids.len(),
                records = records.len(),
                cursor = %self.cursor,
                "Page extracted"
            );

            if short_page {
                // Scan drained; close it now and report Done on the next call
                source.close_scan().await?;
                self.state = State::Finished(DoneReason::Exhausted);
            }
            return Ok(Page::Records(records));
        }
    }

    async fn finish(&mut self, source: &mut dyn ChangeSource) -> Result<Page<R>, SourceError> {
        // Probe before closing so it reads the scan's snapshot
        if self.rows_seen == 0 && self.spec.probe {
            self.probe(source).await?;
        }
        source.close_scan().await?;

        let reason = if self.rows_seen == 0 {
            DoneReason::Empty
        } else if self.emitted == 0 && self.cursor == self.start {
            DoneReason::CaughtUp
        } else {
            DoneReason::Exhausted
        };

        debug!(stream = %self.spec.stream, reason = ?reason, cursor = %self.cursor, "Worker done");
        self.state = State::Finished(reason);
        Ok(Page::Done(reason))
    }

    /// Move the cursor up to the table maximum, never backwards.
    async fn probe(&mut self, source: &mut dyn ChangeSource) -> Result<(), SourceError> {
        let entity = self.spec.selection.entity();
        if let Some(max) = source.probe_max(entity).await? {
            if max > self.cursor {
                debug!(stream = %self.spec.stream, from = %self.cursor, to = %max, "No data, cursor moved to table maximum");
                self.cursor = max;
            }
        }
        Ok(())
    }
}
