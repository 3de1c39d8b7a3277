//! Durable cursor state for the movies ETL.
//!
//! - `CursorStore`: whole-map load and atomic commit
//! - `JsonFileCursorStore`: JSON file replaced via temp-file rename
//! - `MemoryCursorStore`: in-process store for tests and dry runs
//! - `CursorBook`: the in-memory copy read once at startup

pub mod book;
pub mod error;
pub mod store;

pub use book::CursorBook;
pub use error::StateError;
pub use store::{CursorMap, CursorStore, JsonFileCursorStore, MemoryCursorStore};
