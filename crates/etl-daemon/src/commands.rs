//! Command implementations for the ETL daemon.
//!
//! Handles:
//! - run: Load config, pre-check, then loop over the pipelines
//! - check: Pre-check only
//! - cursors: Print the cursor file

use std::sync::Arc;

use anyhow::{Context, Result};
use etl_pipeline::{PostgresSource, RetryPolicy};
use etl_scheduler::{Scheduler, SchedulerConfig};
use etl_state::{CursorBook, CursorStore, JsonFileCursorStore};
use etl_types::Settings;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::pipelines::build_pipelines;

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(config_path: Option<&str>, log_level_override: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Source, cursor book and pipelines wired into one scheduler.
fn build_scheduler(settings: &Settings) -> Result<Scheduler> {
    let retry = RetryPolicy::from_settings(&settings.retry);

    let cursor_path = settings.cursor_file_path();
    info!("Opening cursor file at {:?}", cursor_path);
    let store = Arc::new(JsonFileCursorStore::new(cursor_path));
    let cursors = CursorBook::open(store).context("Failed to open cursor file")?;

    let source = PostgresSource::new(settings.source.dsn.clone(), retry.clone());
    let mut scheduler = Scheduler::new(
        SchedulerConfig::from(&settings.scheduler),
        Box::new(source),
        cursors,
    );

    for pipeline in build_pipelines(settings, &retry).context("Failed to build pipelines")? {
        scheduler.register(pipeline);
    }
    Ok(scheduler)
}

fn startup_retry(settings: &Settings) -> RetryPolicy {
    RetryPolicy::from_settings(&settings.retry).with_max_attempts(settings.startup.max_attempts)
}

/// Cancel `token` on SIGTERM, SIGINT or SIGHUP.
fn install_shutdown_handler(token: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let mut interrupt =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;

        tokio::spawn(async move {
            let name = tokio::select! {
                _ = terminate.recv() => "SIGTERM",
                _ = interrupt.recv() => "SIGINT",
                _ = hangup.recv() => "SIGHUP",
            };
            info!(signal = name, "Shutdown requested, finishing current cycle");
            token.cancel();
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, finishing current cycle");
                token.cancel();
            }
        });
    }

    Ok(())
}

/// Run the ETL daemon.
///
/// 1. Load configuration (defaults -> files -> env -> CLI)
/// 2. Open the cursor file and wire the pipelines
/// 3. Pre-check source and destination, retried up to `startup.max_attempts`
/// 4. Run cycles until SIGTERM/SIGINT/SIGHUP, or a single cycle with `once`
pub async fn run_daemon(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    once: bool,
) -> Result<()> {
    let settings = load_settings(config_path, log_level_override)?;
    init_logging(&settings.log_level)?;

    info!("Movies ETL starting...");
    info!("  Destination: {}", settings.destination.url);
    info!("  Source batch size: {}", settings.source.batch_size);
    info!("  Destination batch size: {}", settings.destination.batch_size);
    info!("  Sleep between cycles: {}s", settings.scheduler.sleep_secs);

    let mut scheduler = build_scheduler(&settings)?;
    scheduler
        .pre_check(&startup_retry(&settings))
        .await
        .context("Pre-check failed")?;

    if once {
        scheduler.run_cycle().await.context("Cycle failed")?;
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    install_shutdown_handler(shutdown.clone())?;
    scheduler.run(shutdown).await.context("Scheduler stopped on error")?;

    info!("Movies ETL stopped");
    Ok(())
}

/// Pre-check every pipeline and exit.
pub async fn check_pipelines(config_path: Option<&str>, log_level_override: Option<&str>) -> Result<()> {
    let settings = load_settings(config_path, log_level_override)?;
    init_logging(&settings.log_level)?;

    let mut scheduler = build_scheduler(&settings)?;
    scheduler
        .pre_check(&startup_retry(&settings))
        .await
        .context("Pre-check failed")?;

    println!("All pipelines ready: {}", scheduler.pipeline_names().join(", "));
    Ok(())
}

/// Print the persisted cursor map.
pub fn show_cursors(config_path: Option<&str>) -> Result<()> {
    let settings = load_settings(config_path, None)?;
    println!("{}", cursors_json(&settings)?);
    Ok(())
}

fn cursors_json(settings: &Settings) -> Result<String> {
    let store = JsonFileCursorStore::new(settings.cursor_file_path());
    let cursors = store.load().context("Failed to read cursor file")?;
    serde_json::to_string_pretty(&cursors).context("Failed to encode cursors")
}
