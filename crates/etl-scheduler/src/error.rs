//! Error types for the scheduler crate.

use etl_pipeline::PipelineError;
use thiserror::Error;

/// Errors that stop the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Source or destination not ready at startup
    #[error("Pre-check failed for pipeline '{pipeline}': {source}")]
    PreCheck {
        pipeline: String,
        source: PipelineError,
    },

    /// A pass failed in a way the next cycle cannot recover from
    #[error("Pipeline '{pipeline}' failed: {source}")]
    Pipeline {
        pipeline: String,
        source: PipelineError,
    },
}
