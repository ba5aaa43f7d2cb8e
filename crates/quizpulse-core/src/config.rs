//! QuizPulse configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{QuizPulseError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizPulseConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl QuizPulseConfig {
    /// Load config from the default path (~/.quizpulse/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| QuizPulseError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| QuizPulseError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| QuizPulseError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the QuizPulse home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".quizpulse")
    }
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Seconds between getUpdates polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

fn bool_true() -> bool {
    true
}
fn default_poll_interval() -> u64 {
    1
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            enabled: bool_true(),
            poll_interval: default_poll_interval(),
        }
    }
}

/// Scheduling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Driver tick period in seconds.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Max chats dispatched in a single tick.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    /// Reschedule delay after a retryable delivery failure.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    /// Enforced floor for per-chat intervals.
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
    /// Interval used when a chat never configured one.
    #[serde(default = "default_interval_secs")]
    pub default_interval_secs: u64,
}

fn default_tick_secs() -> u64 {
    2
}
fn default_max_batch() -> usize {
    100
}
fn default_retry_backoff_secs() -> u64 {
    60
}
fn default_min_interval_secs() -> u64 {
    10
}
fn default_interval_secs() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            max_batch: default_max_batch(),
            retry_backoff_secs: default_retry_backoff_secs(),
            min_interval_secs: default_min_interval_secs(),
            default_interval_secs: default_interval_secs(),
        }
    }
}

/// Daily send caps per chat kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_direct_cap")]
    pub direct_daily_cap: u32,
    #[serde(default = "default_group_cap")]
    pub group_daily_cap: u32,
}

fn default_direct_cap() -> u32 {
    30
}
fn default_group_cap() -> u32 {
    50
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            direct_daily_cap: default_direct_cap(),
            group_daily_cap: default_group_cap(),
        }
    }
}

/// SQLite store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.quizpulse/quizpulse.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Question catalog location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Directory holding one `{category}.json` file per category.
    #[serde(default = "default_catalog_dir")]
    pub dir: String,
}

fn default_catalog_dir() -> String {
    "~/.quizpulse/quizzes".into()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            dir: default_catalog_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let config: QuizPulseConfig = toml::from_str("").unwrap();
        assert_eq!(config.scheduler.tick_secs, 2);
        assert_eq!(config.scheduler.max_batch, 100);
        assert_eq!(config.limits.direct_daily_cap, 30);
        assert_eq!(config.limits.group_daily_cap, 50);
        assert!(config.telegram.enabled);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: QuizPulseConfig =
            toml::from_str("[scheduler]\nretry_backoff_secs = 120\n").unwrap();
        assert_eq!(config.scheduler.retry_backoff_secs, 120);
        assert_eq!(config.scheduler.min_interval_secs, 10);
    }
}
