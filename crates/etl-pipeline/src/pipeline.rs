//! Named pipelines binding workers, a transformer and a loader.
//!
//! One pass runs every worker in order, related-entity kinds first and the
//! aggregate root last. Related workers only re-emit roots at or before the
//! root stream's cursor; newer roots are left to the root worker. A
//! worker's cursor is committed right after all of its batches verified.
//! Workers commit independently: a crash between two commits leaves each
//! stream at a valid, resumable position even if the streams of one
//! pipeline disagree with each other.

use std::time::Instant;

use async_trait::async_trait;
use etl_state::CursorBook;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::extractor::{ExtractorWorker, Page, WorkerSpec};
use crate::loader::{Batch, BatchBuffer, BulkLoader};
use crate::source::{Aggregate, ChangeSource};
use crate::transformer::Transform;

/// Counters for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Records yielded by the workers
    pub extracted: usize,
    /// Documents the destination accepted
    pub loaded: usize,
    /// Bulk requests written
    pub batches: usize,
    /// Streams whose cursor was committed
    pub streams_committed: usize,
}

impl PassReport {
    pub fn merge(&mut self, other: &PassReport) {
        self.extracted += other.extracted;
        self.loaded += other.loaded;
        self.batches += other.batches;
        self.streams_committed += other.streams_committed;
    }

    pub fn has_updates(&self) -> bool {
        self.loaded > 0 || self.streams_committed > 0
    }
}

/// A pipeline the scheduler can run.
#[async_trait]
pub trait SyncPipeline: Send + Sync {
    fn name(&self) -> &str;

    /// Every stream name this pipeline owns, in execution order.
    fn streams(&self) -> Vec<String>;

    /// Source reachable and destination index present.
    async fn pre_check(&self, source: &mut dyn ChangeSource) -> Result<(), PipelineError>;

    /// Exactly one pass over every worker.
    async fn execute(
        &self,
        source: &mut dyn ChangeSource,
        cursors: &mut CursorBook,
    ) -> Result<PassReport, PipelineError>;
}

pub struct Pipeline<T: Transform> {
    name: String,
    aggregate: Aggregate,
    workers: Vec<WorkerSpec>,
    transformer: T,
    loader: Box<dyn BulkLoader>,
    page_size: usize,
}

impl<T: Transform> Pipeline<T> {
    /// Create a pipeline with no workers.
    ///
    /// `page_size` bounds the rows fetched per page from each scan.
    pub fn new(
        name: impl Into<String>,
        aggregate: Aggregate,
        transformer: T,
        loader: Box<dyn BulkLoader>,
        page_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            aggregate,
            workers: Vec::new(),
            transformer,
            loader,
            page_size,
        }
    }

    /// Add a worker. Related-entity workers always run before root workers.
    pub fn with_worker(mut self, spec: WorkerSpec) -> Self {
        self.workers.push(spec);
        // Stable: keeps insertion order within each group
        self.workers.sort_by_key(|w| !w.is_related());
        self
    }

    pub fn workers(&self) -> &[WorkerSpec] {
        &self.workers
    }

    async fn run_worker(
        &self,
        spec: &WorkerSpec,
        source: &mut dyn ChangeSource,
        cursors: &mut CursorBook,
        report: &mut PassReport,
    ) -> Result<(), PipelineError> {
        let start = cursors.get(&spec.stream);
        debug!(pipeline = %self.name, stream = %spec.stream, cursor = %start, "Worker starting");

        let mut worker =
            ExtractorWorker::<T::Record>::new(spec.clone(), self.aggregate, start, self.page_size);
        if spec.is_related() {
            if let Some(root) = self.workers.iter().find(|w| !w.is_related()) {
                worker = worker.with_root_cursor(cursors.get(&root.stream));
            }
        }
        let mut buffer = BatchBuffer::new(self.loader.batch_size());

        while let Page::Records(records) = worker.next_page(source).await? {
            report.extracted += records.len();
            for record in records {
                let doc = self.transformer.transform(record)?;
                if let Some(batch) = buffer.push(&doc)? {
                    self.load_verified(&spec.stream, &batch, report).await?;
                }
            }
        }
        if let Some(batch) = buffer.flush() {
            self.load_verified(&spec.stream, &batch, report).await?;
        }

        if worker.advanced() {
            cursors.advance_and_commit(&spec.stream, worker.cursor().clone())?;
            report.streams_committed += 1;
        }
        Ok(())
    }

    async fn load_verified(
        &self,
        stream: &str,
        batch: &Batch,
        report: &mut PassReport,
    ) -> Result<(), PipelineError> {
        let result = self.loader.write_batch(batch).await?;
        report.batches += 1;

        if !result.verified() {
            error!(
                pipeline = %self.name,
                stream = %stream,
                index = %self.loader.index(),
                sent = result.sent,
                accepted = result.accepted,
                "Bulk write not fully accepted"
            );
            return Err(PipelineError::Verification {
                pipeline: self.name.clone(),
                stream: stream.to_string(),
                sent: result.sent,
                accepted: result.accepted,
            });
        }

        report.loaded += result.accepted;
        debug!(pipeline = %self.name, stream = %stream, loaded = result.accepted, "Batch verified");
        Ok(())
    }
}

#[async_trait]
impl<T: Transform> SyncPipeline for Pipeline<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn streams(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.stream.clone()).collect()
    }

    async fn pre_check(&self, source: &mut dyn ChangeSource) -> Result<(), PipelineError> {
        source.ping().await?;
        self.loader.pre_check().await?;
        debug!(pipeline = %self.name, index = %self.loader.index(), "Pre-check passed");
        Ok(())
    }

    async fn execute(
        &self,
        source: &mut dyn ChangeSource,
        cursors: &mut CursorBook,
    ) -> Result<PassReport, PipelineError> {
        let started = Instant::now();
        let mut report = PassReport::default();

        for spec in &self.workers {
            if let Err(e) = self.run_worker(spec, source, cursors, &mut report).await {
                if let Err(close_err) = source.close_scan().await {
                    warn!(stream = %spec.stream, error = %close_err, "Failed to release scan");
                }
                warn!(
                    pipeline = %self.name,
                    stream = %spec.stream,
                    error = %e,
                    "Worker failed, stream cursor left unchanged"
                );
                return Err(e);
            }
        }

        info!(
            pipeline = %self.name,
            extracted = report.extracted,
            loaded = report.loaded,
            batches = report.batches,
            streams_committed = report.streams_committed,
            duration_ms = started.elapsed().as_millis() as u64,
            "Pass complete"
        );
        Ok(report)
    }
}
