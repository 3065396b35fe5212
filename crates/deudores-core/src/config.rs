//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the API base URL, the last used username, the inactivity timeouts and
//! where the session token is stored.
//!
//! Configuration is stored at `~/.config/deudores/config.json`. The
//! `DEUDORES_API_URL` environment variable overrides the saved base URL.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{FileTokenStore, KeyringTokenStore, TokenStore};
use crate::monitor::{MonitorConfig, GRACE_PERIOD, INACTIVITY_TIMEOUT};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "deudores";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Upper bound for any configured monitor timeout (one day)
const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

pub const API_URL_ENV: &str = "DEUDORES_API_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub last_username: Option<String>,
    pub inactivity_timeout_secs: u64,
    pub grace_period_secs: u64,
    pub token_storage: TokenStorage,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            last_username: None,
            inactivity_timeout_secs: INACTIVITY_TIMEOUT.as_secs(),
            grace_period_secs: GRACE_PERIOD.as_secs(),
            token_storage: TokenStorage::File,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply environment overrides on top of the saved values
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
        self
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Timeouts for the inactivity monitor. Zero values fall back to defaults
    /// and anything above a day is clamped to a day.
    pub fn monitor_config(&self) -> MonitorConfig {
        let defaults = MonitorConfig::default();
        let pick = |secs: u64, default: Duration| {
            if secs == 0 {
                warn!("Ignoring zero timeout in config");
                default
            } else if secs > MAX_TIMEOUT_SECS {
                warn!(secs, "Clamping oversized timeout in config");
                Duration::from_secs(MAX_TIMEOUT_SECS)
            } else {
                Duration::from_secs(secs)
            }
        };
        MonitorConfig {
            inactivity_timeout: pick(self.inactivity_timeout_secs, defaults.inactivity_timeout),
            grace_period: pick(self.grace_period_secs, defaults.grace_period),
        }
    }

    /// Build the configured token store
    pub fn token_store(&self, cache_dir: PathBuf) -> Box<dyn TokenStore> {
        match self.token_storage {
            TokenStorage::File => Box::new(FileTokenStore::new(cache_dir)),
            TokenStorage::Keyring => Box::new(KeyringTokenStore),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_monitor_constants() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:8080");
        assert_eq!(config.monitor_config(), MonitorConfig::default());
        assert_eq!(config.monitor_config().grace_period, Duration::from_secs(3));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"grace_period_secs": 30, "token_storage": "keyring"}"#).unwrap();
        assert_eq!(config.grace_period_secs, 30);
        assert_eq!(config.inactivity_timeout_secs, 300);
        assert_eq!(config.token_storage, TokenStorage::Keyring);
    }

    #[test]
    fn test_zero_timeouts_fall_back() {
        let config = Config {
            inactivity_timeout_secs: 0,
            grace_period_secs: 10,
            ..Default::default()
        };
        let monitor = config.monitor_config();
        assert_eq!(monitor.inactivity_timeout, INACTIVITY_TIMEOUT);
        assert_eq!(monitor.grace_period, Duration::from_secs(10));
    }

    #[test]
    fn test_oversized_timeouts_are_clamped() {
        let config: Config =
            serde_json::from_str(r#"{"inactivity_timeout_secs": 18446744073709551615, "grace_period_secs": 90000}"#)
                .unwrap();
        let monitor = config.monitor_config();
        assert_eq!(monitor.inactivity_timeout, Duration::from_secs(MAX_TIMEOUT_SECS));
        assert_eq!(monitor.grace_period, Duration::from_secs(MAX_TIMEOUT_SECS));

        // Mounting with the clamped values must not overflow
        let start = std::time::Instant::now();
        let mut mounted = crate::monitor::InactivityMonitor::mount(monitor, start);
        assert_eq!(mounted.poll(start), None);
    }
}
