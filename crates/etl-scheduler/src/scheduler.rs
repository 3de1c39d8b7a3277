//! The scheduling loop.
//!
//! Owns the change source and the cursor book for the life of the process
//! and hands both to each pipeline in turn. Pipelines never overlap.

use std::time::Instant;

use etl_pipeline::{ChangeSource, PassReport, RetryPolicy, Retryable, SyncPipeline};
use etl_state::CursorBook;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::registry::{PassResult, StatusRegistry};
use crate::{SchedulerConfig, SchedulerError};

pub struct Scheduler {
    config: SchedulerConfig,
    source: Box<dyn ChangeSource>,
    cursors: CursorBook,
    pipelines: Vec<Box<dyn SyncPipeline>>,
    registry: StatusRegistry,
    cycles: u64,
}

impl Scheduler {
    /// Create a scheduler with no pipelines.
    pub fn new(config: SchedulerConfig, source: Box<dyn ChangeSource>, cursors: CursorBook) -> Self {
        Self {
            config,
            source,
            cursors,
            pipelines: Vec::new(),
            registry: StatusRegistry::new(),
            cycles: 0,
        }
    }

    /// Append a pipeline to the cycle and register its streams in the
    /// cursor book.
    pub fn register(&mut self, pipeline: Box<dyn SyncPipeline>) {
        let streams = pipeline.streams();
        self.cursors.register(streams.iter().map(String::as_str));
        self.registry.register(pipeline.name());
        info!(pipeline = %pipeline.name(), streams = ?streams, "Pipeline registered");
        self.pipelines.push(pipeline);
    }

    pub fn pipeline_names(&self) -> Vec<&str> {
        self.pipelines.iter().map(|p| p.name()).collect()
    }

    pub fn cursors(&self) -> &CursorBook {
        &self.cursors
    }

    pub fn registry(&self) -> &StatusRegistry {
        &self.registry
    }

    /// Completed cycles since start.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Check every pipeline's source and destination.
    ///
    /// Transient failures are retried under `retry`. Any failure left after
    /// that is returned and should end the process.
    pub async fn pre_check(&mut self, retry: &RetryPolicy) -> Result<(), SchedulerError> {
        for pipeline in &self.pipelines {
            let mut backoff = retry.backoff(&format!("pre-check {}", pipeline.name()));
            loop {
                match pipeline.pre_check(self.source.as_mut()).await {
                    Ok(()) => break,
                    Err(e) => {
                        if e.is_transient() && backoff.pause(&e).await {
                            continue;
                        }
                        error!(pipeline = %pipeline.name(), error = %e, "Pre-check failed");
                        return Err(SchedulerError::PreCheck {
                            pipeline: pipeline.name().to_string(),
                            source: e,
                        });
                    }
                }
            }
            info!(pipeline = %pipeline.name(), "Pre-check passed");
        }
        Ok(())
    }

    /// Run every pipeline once, in registration order.
    ///
    /// A pass that fails only for its own window is logged and the cycle
    /// moves on to the next pipeline. Any other failure ends the cycle and
    /// is returned.
    pub async fn run_cycle(&mut self) -> Result<PassReport, SchedulerError> {
        let started = Instant::now();
        let mut totals = PassReport::default();

        for pipeline in &self.pipelines {
            let name = pipeline.name();
            let pass_started = Instant::now();
            let outcome = pipeline.execute(self.source.as_mut(), &mut self.cursors).await;
            let duration_ms = pass_started.elapsed().as_millis() as u64;

            match outcome {
                Ok(report) => {
                    totals.merge(&report);
                    self.registry
                        .record_complete(name, PassResult::Success, duration_ms, Some(&report));
                }
                Err(e) if e.aborts_pass_only() => {
                    warn!(pipeline = %name, error = %e, "Pass aborted, window retried next cycle");
                    self.registry
                        .record_complete(name, PassResult::Failed(e.to_string()), duration_ms, None);
                }
                Err(e) => {
                    error!(pipeline = %name, error = %e, "Pass failed, stopping");
                    self.registry
                        .record_complete(name, PassResult::Failed(e.to_string()), duration_ms, None);
                    return Err(SchedulerError::Pipeline {
                        pipeline: name.to_string(),
                        source: e,
                    });
                }
            }
        }

        self.cycles += 1;
        info!(
            cycle = self.cycles,
            extracted = totals.extracted,
            loaded = totals.loaded,
            batches = totals.batches,
            streams_committed = totals.streams_committed,
            duration_ms = started.elapsed().as_millis() as u64,
            "Cycle complete"
        );
        Ok(totals)
    }

    /// Run cycles until `shutdown` is cancelled.
    ///
    /// Cancellation is seen before each cycle and during the sleep between
    /// cycles; a running cycle is always finished first.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), SchedulerError> {
        info!(
            pipelines = self.pipelines.len(),
            sleep_secs = self.config.sleep_secs,
            "Scheduler started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }
            self.run_cycle().await?;

            if shutdown.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval()) => {}
            }
        }

        info!(cycles = self.cycles, "Scheduler stopped");
        Ok(())
    }
}
