//! # etl-types
//!
//! Shared domain types for the movies ETL.
//!
//! - Cursors: `(timestamp, id)` positions in a change stream
//! - Records: enriched aggregates read from the relational source
//! - Documents: the shapes written to each search index
//! - Settings: layered configuration

pub mod config;
pub mod cursor;
pub mod document;
pub mod error;
pub mod record;

pub use crate::config::{
    DestinationSettings, IndexSettings, RetrySettings, SchedulerSettings, Settings,
    SourceSettings, StartupSettings, StateSettings, StreamSettings,
};
pub use crate::cursor::Cursor;
pub use crate::document::{FilmDocument, GenreDocument, IndexDocument, PersonDocument};
pub use crate::error::SettingsError;
pub use crate::record::{
    FilmWorkRecord, GenreRecord, MovieRef, NamedRef, PersonRecord, Role, RoleMovies, RolePerson,
};
