//! Cursor state error types.

use etl_types::Cursor;
use thiserror::Error;

/// Errors that can occur while loading or committing cursors
#[derive(Error, Debug)]
pub enum StateError {
    /// Filesystem operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Cursor map could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A commit tried to move a stream cursor backwards
    #[error("Cursor for stream '{stream}' would regress from {current} to {proposed}")]
    Regression {
        stream: String,
        current: Cursor,
        proposed: Cursor,
    },

    /// In-memory store lock was poisoned by a panicking writer
    #[error("Cursor store lock poisoned")]
    Poisoned,
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

impl From<tempfile::PersistError> for StateError {
    fn from(err: tempfile::PersistError) -> Self {
        StateError::Io(err.error)
    }
}
