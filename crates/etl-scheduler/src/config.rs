//! Scheduler configuration.

use std::time::Duration;

use etl_types::SchedulerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the scheduler loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds to sleep between the end of one cycle and the start of the next.
    /// Defaults to 60.
    #[serde(default = "default_sleep_secs")]
    pub sleep_secs: u64,
}

fn default_sleep_secs() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sleep_secs: default_sleep_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sleep_secs)
    }
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            sleep_secs: settings.sleep_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.sleep_secs, 60);
        assert_eq!(config.interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_from_settings() {
        let settings = SchedulerSettings { sleep_secs: 5 };
        assert_eq!(SchedulerConfig::from(&settings).interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_key_uses_default() {
        let config: SchedulerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.sleep_secs, 60);
    }
}
