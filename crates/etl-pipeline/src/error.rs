//! Error types for extraction, loading and pipeline passes.

use etl_state::StateError;
use thiserror::Error;

use crate::retry::Retryable;

/// Errors raised by a change source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Connection could not be opened or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// The database rejected a statement
    #[error("Query error: {0}")]
    Query(String),

    /// A row or enrichment payload did not have the expected shape
    #[error("Data error: {0}")]
    Data(String),
}

impl Retryable for SourceError {
    fn is_transient(&self) -> bool {
        matches!(self, SourceError::Connection(_))
    }
}

impl From<tokio_postgres::Error> for SourceError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.code() {
            // Class 08 is connection exception, 57P0x is server shutdown
            Some(code) if code.code().starts_with("08") || code.code().starts_with("57P0") => {
                SourceError::Connection(err.to_string())
            }
            Some(_) => SourceError::Query(err.to_string()),
            None => {
                let io_failure = std::error::Error::source(&err)
                    .map(|source| source.is::<std::io::Error>())
                    .unwrap_or(false);
                if err.is_closed() || io_failure {
                    SourceError::Connection(err.to_string())
                } else {
                    SourceError::Query(err.to_string())
                }
            }
        }
    }
}

/// Errors raised by a bulk loader.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Request never produced a response
    #[error("Connection error: {0}")]
    Connection(String),

    /// Non-success HTTP status
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// Response body could not be understood
    #[error("Response error: {0}")]
    Response(String),

    /// Document could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Destination index is absent
    #[error("Index '{0}' does not exist")]
    MissingIndex(String),
}

impl Retryable for LoadError {
    fn is_transient(&self) -> bool {
        match self {
            LoadError::Connection(_) => true,
            LoadError::Http { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        LoadError::Serialization(err.to_string())
    }
}

/// Errors that end a pipeline pass.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Destination accepted a different number of documents than were sent
    #[error(
        "Batch verification failed in pipeline '{pipeline}' for stream '{stream}': sent {sent}, accepted {accepted}"
    )]
    Verification {
        pipeline: String,
        stream: String,
        sent: usize,
        accepted: usize,
    },

    /// A record could not be turned into a document
    #[error("Transform error: {0}")]
    Transform(String),
}

impl PipelineError {
    /// True for failures confined to one pass.
    ///
    /// The window that failed is retried by the next cycle. Anything else is
    /// unclassified and should stop the process.
    pub fn aborts_pass_only(&self) -> bool {
        matches!(
            self,
            PipelineError::Verification { .. }
                | PipelineError::Transform(_)
                | PipelineError::Source(SourceError::Data(_))
        )
    }
}

impl Retryable for PipelineError {
    fn is_transient(&self) -> bool {
        match self {
            PipelineError::Source(e) => e.is_transient(),
            PipelineError::Load(e) => e.is_transient(),
            _ => false,
        }
    }
}
