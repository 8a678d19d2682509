//! Host configuration, loaded from a TOML file.

use rapid_framework::{OfferConfig, Thresholds, DEFAULT_THRESHOLDS};
use rapid_sql::SqlSessionBuilder;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

fn default_tick_interval() -> u64 {
    50 // 20 ticks per second
}

fn default_waiting_window() -> u64 {
    10_000
}

fn default_poll_interval() -> u64 {
    50
}

fn default_thresholds() -> Vec<u64> {
    DEFAULT_THRESHOLDS.to_vec()
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub offers: OfferSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Interval of the main tick that runs plugin callbacks, in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferSettings {
    /// How long a player has to answer an offer
    #[serde(default = "default_waiting_window")]
    pub waiting_window_ms: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Remaining times (ms) at which the player is reminded
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<u64>,
}

impl Default for OfferSettings {
    fn default() -> Self {
        Self {
            waiting_window_ms: default_waiting_window(),
            poll_interval_ms: default_poll_interval(),
            thresholds: default_thresholds(),
        }
    }
}

/// Where offer outcomes are recorded. Nothing is recorded without a URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

impl StorageSettings {
    /// Session builder for the configured database. A value without a URL
    /// scheme is taken as a SQLite file path.
    pub fn session_builder(&self) -> Option<SqlSessionBuilder> {
        let url = self.database_url.as_deref()?;
        if url.starts_with("sqlite:") || url.starts_with("mysql:") {
            Some(SqlSessionBuilder::url(url))
        } else {
            Some(SqlSessionBuilder::sqlite(url))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads the configuration, writing the defaults to `path` first if the
    /// file does not exist.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            Ok(toml::from_str(&content)?)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.server.tick_interval_ms)
    }

    pub fn offer_config(&self) -> OfferConfig {
        OfferConfig {
            waiting_window: Duration::from_millis(self.offers.waiting_window_ms),
            poll_interval: Duration::from_millis(self.offers.poll_interval_ms),
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::new(self.offers.thresholds.iter().copied())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.tick_interval_ms == 0 {
            return Err("Tick interval must be greater than 0".to_string());
        }

        if self.offers.waiting_window_ms == 0 {
            return Err("Offer waiting window must be greater than 0".to_string());
        }
        if self.offers.poll_interval_ms == 0 {
            return Err("Offer poll interval must be greater than 0".to_string());
        }
        if self.offers.poll_interval_ms > self.offers.waiting_window_ms {
            return Err("Offer poll interval must not exceed the waiting window".to_string());
        }

        if let Some(url) = &self.storage.database_url {
            if url.trim().is_empty() {
                return Err("Database URL cannot be empty".to_string());
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
