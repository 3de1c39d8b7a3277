//! Bulk loading into a search index.

mod elasticsearch;

use async_trait::async_trait;
use etl_types::IndexDocument;

use crate::error::LoadError;

pub use elasticsearch::ElasticsearchLoader;

/// One document ready for an upsert by id.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub id: String,
    pub source: serde_json::Value,
}

/// Ordered documents sent in one bulk request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    entries: Vec<BatchEntry>,
}

impl Batch {
    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<BatchEntry>> for Batch {
    fn from(entries: Vec<BatchEntry>) -> Self {
        Self { entries }
    }
}

/// Outcome of one bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadResult {
    pub sent: usize,
    pub accepted: usize,
}

impl LoadResult {
    pub fn verified(&self) -> bool {
        self.sent == self.accepted
    }
}

/// Write side of the pipeline.
#[async_trait]
pub trait BulkLoader: Send + Sync {
    /// Index this loader writes to.
    fn index(&self) -> &str;

    /// Maximum documents per batch.
    fn batch_size(&self) -> usize;

    /// Verify the destination is reachable and the index exists.
    async fn pre_check(&self) -> Result<(), LoadError>;

    /// Upsert every entry of `batch`, retrying connectivity failures.
    async fn write_batch(&self, batch: &Batch) -> Result<LoadResult, LoadError>;
}

/// Accumulates documents until a batch is full.
#[derive(Debug)]
pub struct BatchBuffer {
    limit: usize,
    pending: Vec<BatchEntry>,
}

impl BatchBuffer {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            pending: Vec::with_capacity(limit),
        }
    }

    /// Add a document; returns a full batch once `limit` is reached.
    pub fn push<D: IndexDocument>(&mut self, doc: &D) -> Result<Option<Batch>, LoadError> {
        self.pending.push(BatchEntry {
            id: doc.document_id().to_string(),
            source: serde_json::to_value(doc)?,
        });
        if self.pending.len() >= self.limit {
            return Ok(self.flush());
        }
        Ok(None)
    }

    /// Whatever is pending, if anything.
    pub fn flush(&mut self) -> Option<Batch> {
        if self.pending.is_empty() {
            return None;
        }
        let entries = std::mem::replace(&mut self.pending, Vec::with_capacity(self.limit));
        Some(Batch { entries })
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
