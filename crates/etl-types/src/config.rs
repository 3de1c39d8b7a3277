//! Configuration loading for the movies ETL.
//!
//! Layered config: defaults -> default config file -> CLI config file ->
//! environment (`ETL__SECTION__KEY`). CLI flags are applied by the caller.

use std::path::PathBuf;
use std::time::Duration;

use ::config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

const APP_NAME: &str = "movies-etl";

/// Relational source connection and paging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// PostgreSQL connection string (URL or key=value form)
    #[serde(default = "default_dsn")]
    pub dsn: String,

    /// Rows fetched per page from a server-side cursor
    #[serde(default = "default_source_batch_size")]
    pub batch_size: usize,
}

fn default_dsn() -> String {
    "postgres://app@localhost:5432/movies_database".to_string()
}

fn default_source_batch_size() -> usize {
    500
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            dsn: default_dsn(),
            batch_size: default_source_batch_size(),
        }
    }
}

/// Search index endpoint and bulk sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationSettings {
    #[serde(default = "default_destination_url")]
    pub url: String,

    /// Documents per bulk request
    #[serde(default = "default_destination_batch_size")]
    pub batch_size: usize,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_destination_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_destination_batch_size() -> usize {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for DestinationSettings {
    fn default() -> Self {
        Self {
            url: default_destination_url(),
            batch_size: default_destination_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Index names, one per pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    #[serde(default = "default_movies_index")]
    pub movies: String,
    #[serde(default = "default_persons_index")]
    pub persons: String,
    #[serde(default = "default_genres_index")]
    pub genres: String,
}

fn default_movies_index() -> String {
    "movies".to_string()
}

fn default_persons_index() -> String {
    "persons".to_string()
}

fn default_genres_index() -> String {
    "genres".to_string()
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            movies: default_movies_index(),
            persons: default_persons_index(),
            genres: default_genres_index(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Pause between cycles
    #[serde(default = "default_sleep_secs")]
    pub sleep_secs: u64,
}

fn default_sleep_secs() -> u64 {
    60
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            sleep_secs: default_sleep_secs(),
        }
    }
}

impl SchedulerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sleep_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSettings {
    /// JSON file holding every stream cursor
    #[serde(default = "default_cursor_file")]
    pub cursor_file: String,
}

fn default_cursor_file() -> String {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().join("cursors.json"))
        .unwrap_or_else(|| PathBuf::from("./cursors.json"))
        .to_string_lossy()
        .to_string()
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            cursor_file: default_cursor_file(),
        }
    }
}

/// Exponential backoff for network operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// First pause
    #[serde(default = "default_start_ms")]
    pub start_ms: u64,

    /// Multiplier applied after each failed attempt
    #[serde(default = "default_factor")]
    pub factor: f64,

    /// Ceiling for a single pause
    #[serde(default = "default_border_secs")]
    pub border_secs: u64,

    /// Give up after this many failed attempts; retry forever when unset
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_start_ms() -> u64 {
    100
}

fn default_factor() -> f64 {
    2.0
}

fn default_border_secs() -> u64 {
    30
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            start_ms: default_start_ms(),
            factor: default_factor(),
            border_secs: default_border_secs(),
            max_attempts: None,
        }
    }
}

impl RetrySettings {
    pub fn start(&self) -> Duration {
        Duration::from_millis(self.start_ms)
    }

    pub fn border(&self) -> Duration {
        Duration::from_secs(self.border_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupSettings {
    /// Pre-check attempts before the process gives up
    #[serde(default = "default_startup_attempts")]
    pub max_attempts: u32,
}

fn default_startup_attempts() -> u32 {
    5
}

impl Default for StartupSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_startup_attempts(),
        }
    }
}

/// Names under which each stream's cursor is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    #[serde(default = "default_film_work_stream")]
    pub film_work: String,
    #[serde(default = "default_film_work_person_stream")]
    pub film_work_person: String,
    #[serde(default = "default_film_work_genre_stream")]
    pub film_work_genre: String,
    #[serde(default = "default_film_work_mark_stream")]
    pub film_work_mark: String,
    #[serde(default = "default_person_stream")]
    pub person: String,
    #[serde(default = "default_genre_stream")]
    pub genre: String,
}

fn default_film_work_stream() -> String {
    "film_work".to_string()
}

fn default_film_work_person_stream() -> String {
    "film_work.person".to_string()
}

fn default_film_work_genre_stream() -> String {
    "film_work.genre".to_string()
}

fn default_film_work_mark_stream() -> String {
    "film_work.mark".to_string()
}

fn default_person_stream() -> String {
    "person".to_string()
}

fn default_genre_stream() -> String {
    "genre".to_string()
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            film_work: default_film_work_stream(),
            film_work_person: default_film_work_person_stream(),
            film_work_genre: default_film_work_genre_stream(),
            film_work_mark: default_film_work_mark_stream(),
            person: default_person_stream(),
            genre: default_genre_stream(),
        }
    }
}

impl StreamSettings {
    fn all(&self) -> [&str; 6] {
        [
            &self.film_work,
            &self.film_work_person,
            &self.film_work_genre,
            &self.film_work_mark,
            &self.person,
            &self.genre,
        ]
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub source: SourceSettings,

    #[serde(default)]
    pub destination: DestinationSettings,

    #[serde(default)]
    pub indexes: IndexSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub state: StateSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub startup: StartupSettings,

    #[serde(default)]
    pub streams: StreamSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            source: SourceSettings::default(),
            destination: DestinationSettings::default(),
            indexes: IndexSettings::default(),
            scheduler: SchedulerSettings::default(),
            state: StateSettings::default(),
            retry: RetrySettings::default(),
            startup: StartupSettings::default(),
            streams: StreamSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/movies-etl/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (ETL__SOURCE__DSN, ETL__SCHEDULER__SLEEP_SECS, ...)
    ///
    /// The merged result is validated before it is returned.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, SettingsError> {
        let config_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())?
            .set_default("source.batch_size", default_source_batch_size() as i64)?
            .set_default(
                "destination.batch_size",
                default_destination_batch_size() as i64,
            )?
            .set_default("scheduler.sleep_secs", default_sleep_secs() as i64)?
            .set_default("state.cursor_file", default_cursor_file())?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Double underscore keeps single underscores inside key names intact
        builder = builder.add_source(
            Environment::with_prefix("ETL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.source.batch_size == 0 {
            return Err(SettingsError::Invalid(
                "source.batch_size must be > 0".to_string(),
            ));
        }
        if self.destination.batch_size < self.source.batch_size {
            return Err(SettingsError::Invalid(format!(
                "destination.batch_size ({}) must be >= source.batch_size ({})",
                self.destination.batch_size, self.source.batch_size
            )));
        }
        if self.retry.factor.is_nan() || self.retry.factor < 1.0 {
            return Err(SettingsError::Invalid(format!(
                "retry.factor must be >= 1.0, got {}",
                self.retry.factor
            )));
        }
        if self.retry.start_ms == 0 {
            return Err(SettingsError::Invalid(
                "retry.start_ms must be > 0".to_string(),
            ));
        }
        if self.startup.max_attempts == 0 {
            return Err(SettingsError::Invalid(
                "startup.max_attempts must be > 0".to_string(),
            ));
        }

        let names = self.streams.all();
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(SettingsError::Invalid(
                    "stream names must not be empty".to_string(),
                ));
            }
            if names[..i].contains(name) {
                return Err(SettingsError::Invalid(format!(
                    "stream name '{}' is used twice",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Cursor file path with a leading `~/` expanded.
    pub fn cursor_file_path(&self) -> PathBuf {
        let raw = &self.state.cursor_file;
        if let Some(rest) = raw.strip_prefix("~/") {
            if let Some(dirs) = directories::BaseDirs::new() {
                return dirs.home_dir().join(rest);
            }
        }
        PathBuf::from(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.source.batch_size, 500);
        assert_eq!(settings.destination.batch_size, 1000);
        assert_eq!(settings.scheduler.sleep_secs, 60);
        assert_eq!(settings.indexes.movies, "movies");
        assert_eq!(settings.streams.film_work_person, "film_work.person");
        assert_eq!(settings.retry.start(), Duration::from_millis(100));
        assert_eq!(settings.retry.border(), Duration::from_secs(30));
        assert!(settings.retry.max_attempts.is_none());
        assert_eq!(settings.startup.max_attempts, 5);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"

[source]
dsn = "postgres://etl@db/movies"
batch_size = 100

[destination]
batch_size = 200

[scheduler]
sleep_secs = 5

[retry]
max_attempts = 3
"#
        )
        .unwrap();

        let settings = Settings::load(Some(&file.path().to_string_lossy())).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.source.dsn, "postgres://etl@db/movies");
        assert_eq!(settings.source.batch_size, 100);
        assert_eq!(settings.destination.batch_size, 200);
        assert_eq!(settings.scheduler.interval(), Duration::from_secs(5));
        assert_eq!(settings.retry.max_attempts, Some(3));
        // Untouched keys keep their defaults
        assert_eq!(settings.indexes.genres, "genres");
    }

    #[test]
    fn test_load_rejects_small_destination_batch() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "[source]\nbatch_size = 500\n[destination]\nbatch_size = 100").unwrap();

        let err = Settings::load(Some(&file.path().to_string_lossy())).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
    }

    #[test]
    fn test_missing_cli_file_is_error() {
        let result = Settings::load(Some("/nonexistent/movies-etl/config.toml"));
        assert!(matches!(result, Err(SettingsError::Load(_))));
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::default();
        settings.source.batch_size = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.retry.factor = 0.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.streams.genre = settings.streams.person.clone();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.destination.batch_size = settings.source.batch_size;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_cursor_file_path_plain() {
        let mut settings = Settings::default();
        settings.state.cursor_file = "/var/lib/etl/cursors.json".to_string();
        assert_eq!(
            settings.cursor_file_path(),
            PathBuf::from("/var/lib/etl/cursors.json")
        );
    }
}
