//! Movies ETL daemon
//!
//! Keeps the movies, persons and genres search indexes in sync with the
//! PostgreSQL catalog.
//!
//! # Usage
//!
//! ```bash
//! etl-daemon run [--once]
//! etl-daemon check
//! etl-daemon cursors
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/movies-etl/config.toml)
//! 3. `--config` file
//! 4. Environment variables (ETL__SECTION__KEY)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use etl_daemon::{check_pipelines, run_daemon, show_cursors, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { once } => {
            run_daemon(cli.config.as_deref(), cli.log_level.as_deref(), once).await?;
        }
        Commands::Check => {
            check_pipelines(cli.config.as_deref(), cli.log_level.as_deref()).await?;
        }
        Commands::Cursors => {
            show_cursors(cli.config.as_deref())?;
        }
    }

    Ok(())
}
