//! CLI argument parsing for the ETL daemon.
//!
//! CLI flags override every other config source.

use clap::{Parser, Subcommand};

/// Movies ETL daemon
///
/// Incrementally copies film works, persons and genres from PostgreSQL into
/// Elasticsearch.
#[derive(Parser, Debug)]
#[command(name = "etl-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/movies-etl/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pre-check, then run pipelines every cycle until stopped
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Check source and destination readiness and exit
    Check,

    /// Print the persisted cursor of every stream as JSON
    Cursors,
}
