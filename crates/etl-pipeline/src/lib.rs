//! # etl-pipeline
//!
//! Change-data-capture pipelines from PostgreSQL into Elasticsearch.
//!
//! A pass walks every worker of a pipeline in order (related-entity kinds
//! first, the aggregate root last):
//! 1. The worker scans its change stream from the stored cursor
//! 2. Each page of changed root ids is rehydrated by one enrichment query
//! 3. Records are transformed into index documents and buffered into batches
//! 4. Each batch is bulk-written and its accepted count verified
//! 5. The worker's cursor is committed once all of its batches verified

pub mod error;
pub mod extractor;
pub mod loader;
pub mod pipeline;
pub mod retry;
pub mod source;
pub mod transformer;

pub use error::{LoadError, PipelineError, SourceError};
pub use extractor::{DoneReason, ExtractorWorker, Page, WorkerSpec};
pub use loader::{Batch, BatchBuffer, BatchEntry, BulkLoader, ElasticsearchLoader, LoadResult};
pub use pipeline::{PassReport, Pipeline, SyncPipeline};
pub use retry::{Backoff, RetryNotice, RetryPolicy, Retryable};
pub use source::{Aggregate, ChangeRow, ChangeSource, Entity, PostgresSource, Selection};
pub use transformer::{FilmTransformer, GenreTransformer, PersonTransformer, Transform};
