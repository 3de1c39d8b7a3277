//! Movies ETL daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (run, check, cursors)
//! - `pipelines`: Builds the three pipelines from settings

pub mod cli;
pub mod commands;
pub mod pipelines;

pub use cli::{Cli, Commands};
pub use commands::{check_pipelines, load_settings, run_daemon, show_cursors};
pub use pipelines::build_pipelines;
