use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;

use crate::types::error::{OutboxError, Result};

/// Engine configuration
///
/// Every section is optional in the TOML file; missing keys take defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    pub storage: StorageConfig,
    pub scheduled_send: ScheduledSendConfig,
    pub follow_up: FollowUpConfig,
    pub tracking: TrackingConfig,
    pub notifications: NotificationConfig,
}

/// Where records are persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file (default: `<data dir>/outbox/outbox.db`)
    pub path: Option<PathBuf>,

    /// Keep everything in memory; nothing survives a restart
    pub in_memory: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduledSendConfig {
    /// Seconds between due-send passes
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowUpConfig {
    /// Seconds between due-reminder checks
    pub poll_interval_secs: u64,

    /// Reminders overdue by more than this get an automated email
    pub automated_after_hours: i64,

    /// Overdue by more than this switches to the "circling back" tone
    pub circling_back_after_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Endpoint serving the open pixel and click redirects
    pub base_url: String,

    /// Fabricate read receipts and clicks; demo builds only
    pub simulate_events: bool,

    pub read_delay: DelayRange,
    pub click_delay: DelayRange,
}

/// Inclusive bounds of a randomized delay, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_secs: u64,
    pub max_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
}

impl Default for ScheduledSendConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
        }
    }
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3600,
            automated_after_hours: 24,
            circling_back_after_days: 7,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://track.localhost/t".to_string(),
            simulate_events: true,
            read_delay: DelayRange {
                min_secs: 5,
                max_secs: 15,
            },
            click_delay: DelayRange {
                min_secs: 10,
                max_secs: 30,
            },
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl ScheduledSendConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }
}

impl FollowUpConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }

    pub fn automated_after(&self) -> chrono::Duration {
        chrono::Duration::hours(self.automated_after_hours)
    }

    pub fn circling_back_after(&self) -> chrono::Duration {
        chrono::Duration::days(self.circling_back_after_days)
    }
}

impl DelayRange {
    pub fn min(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.min_secs)
    }

    pub fn max(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.max_secs)
    }
}

impl StorageConfig {
    /// Database location, falling back to the platform data directory
    pub fn resolve_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }

        dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .map(|dir| dir.join("outbox").join("outbox.db"))
            .ok_or_else(|| OutboxError::Config("No data directory available".to_string()))
    }
}

impl OutboxConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: OutboxConfig = toml::from_str(content)
            .map_err(|e| OutboxError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        info!("Loading configuration from: {:?}", path);

        let content = fs::read_to_string(path)
            .map_err(|e| OutboxError::Config(format!("Failed to read config: {}", e)))?;

        Self::from_toml_str(&content)
    }

    /// Load from the first existing default path, or use defaults
    pub fn load() -> Result<Self> {
        for path in default_config_paths() {
            if path.exists() {
                info!("Found config at: {:?}", path);
                return Self::load_from_path(&path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduled_send.poll_interval_secs == 0 {
            return Err(OutboxError::Config(
                "scheduled_send.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.follow_up.poll_interval_secs == 0 {
            return Err(OutboxError::Config(
                "follow_up.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.follow_up.automated_after_hours < 0 || self.follow_up.circling_back_after_days < 0
        {
            return Err(OutboxError::Config(
                "follow_up thresholds must not be negative".to_string(),
            ));
        }

        for (name, range) in [
            ("read_delay", self.tracking.read_delay),
            ("click_delay", self.tracking.click_delay),
        ] {
            if range.min_secs > range.max_secs {
                return Err(OutboxError::Config(format!(
                    "tracking.{}: min_secs ({}) exceeds max_secs ({})",
                    name, range.min_secs, range.max_secs
                )));
            }
        }

        let base = Url::parse(&self.tracking.base_url).map_err(|e| {
            OutboxError::Config(format!(
                "tracking.base_url '{}' is invalid: {}",
                self.tracking.base_url, e
            ))
        })?;
        if base.cannot_be_a_base() {
            return Err(OutboxError::Config(format!(
                "tracking.base_url '{}' cannot hold paths",
                self.tracking.base_url
            )));
        }

        Ok(())
    }
}

/// Get default config paths
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("outbox").join("config.toml"));
    }

    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".config").join("outbox").join("config.toml"));
    }

    paths
}
