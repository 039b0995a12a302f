use serde::{Deserialize, Serialize};
use std::time::Duration;
use tether_core::AppConfig;
use thiserror::Error;

const LOG_LEVELS: [&str; 5] = ["debug", "info", "warn", "error", "nope"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("log_level must be one of: debug, info, warn, error, nope (got {0:?})")]
    LogLevel(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("default_window_id must not be empty")]
    EmptyWindowId,
}

/// Host settings, deserialized from JSON with per-field defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
    /// How often the metrics summary is logged
    pub metrics_interval_ms: u64,
    pub allow_async_window_updates: bool,
    pub lock_timeout_ms: u64,
    pub full_refresh_on_error: bool,
    pub default_window_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let app = AppConfig::default();
        Self {
            log_level: "debug".to_string(),
            metrics_interval_ms: 1000,
            allow_async_window_updates: app.allow_async_window_updates,
            lock_timeout_ms: app.lock_timeout.as_millis() as u64,
            full_refresh_on_error: app.full_refresh_on_error,
            default_window_id: app.default_window_id,
        }
    }
}

impl ServerConfig {
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(source)?;
        config.log_level = config.log_level.to_lowercase();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::LogLevel(self.log_level.clone()));
        }
        if self.metrics_interval_ms == 0 {
            return Err(ConfigError::Zero {
                field: "metrics_interval_ms",
            });
        }
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::Zero {
                field: "lock_timeout_ms",
            });
        }
        if self.default_window_id.is_empty() {
            return Err(ConfigError::EmptyWindowId);
        }
        Ok(())
    }

    pub fn logging_enabled(&self) -> bool {
        self.log_level != "nope"
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    /// Engine settings for every application the host creates
    pub fn app_config(&self) -> AppConfig {
        AppConfig {
            allow_async_window_updates: self.allow_async_window_updates,
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            full_refresh_on_error: self.full_refresh_on_error,
            default_window_id: self.default_window_id.clone(),
        }
    }
}

/// Install the global `fmt` subscriber
///
/// `RUST_LOG` wins over the configured level. Does nothing when the level is
/// `nope` or a subscriber is already installed.
pub fn init_tracing(config: &ServerConfig) {
    if !config.logging_enabled() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .try_init();
}
