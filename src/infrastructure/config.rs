//! Configuration infrastructure
//!
//! Process-wide configuration loaded at startup from an optional TOML file
//! plus `SHIPWATCH_*` environment overrides. Run-scoped settings (milestone
//! days, templates, per-run limits) live in the `settings` table instead and
//! are re-read before every run; see `SettingsRepository`.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub carrier: CarrierConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub delivery: DeliveryRetryConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret expected as a bearer token on the scheduled-scan
    /// endpoint. `None` disables that endpoint entirely.
    pub scheduled_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8088,
            scheduled_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL; when empty the platform data directory is used.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
        }
    }
}

impl DatabaseConfig {
    /// Resolve the effective database URL, falling back to
    /// `<data_dir>/shipwatch/shipwatch.db`.
    pub fn resolved_url(&self) -> String {
        if !self.url.is_empty() {
            return self.url.clone();
        }
        let dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shipwatch");
        format!("sqlite:{}", dir.join("shipwatch.db").display())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierConfig {
    /// Base URL of the carrier tracking endpoint.
    pub endpoint: String,
    pub request_timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9090/track".to_string(),
            request_timeout_seconds: 30,
            user_agent: "shipwatch/0.3 (+https://github.com/shipwatch/shipwatch)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Base URL of the transactional email provider.
    pub endpoint: String,
    pub api_key: String,
    pub sender: String,
    pub request_timeout_seconds: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9091/messages".to_string(),
            api_key: String::new(),
            sender: "orders@example.test".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

/// Retry policy defaults for the outbound delivery pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub exponential_backoff: bool,
}

impl Default for DeliveryRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            exponential_backoff: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long a completed/stopped session stays pollable before eviction.
    pub removal_grace_secs: u64,
    /// Bounded trailing window of per-item results kept for status polls.
    pub trailing_results: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            removal_grace_secs: 60,
            trailing_results: 20,
        }
    }
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
    pub console_output: bool,
    pub file_output: bool,
    /// Directory for rolling log files when file output is enabled.
    pub log_dir: Option<String>,
    /// Module-specific log level filters (e.g. "sqlx": "warn").
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_filters = HashMap::new();
        module_filters.insert("sqlx".to_string(), "warn".to_string());
        module_filters.insert("hyper".to_string(), "info".to_string());
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: false,
            log_dir: None,
            module_filters,
        }
    }
}

/// Default config file location: `$SHIPWATCH_CONFIG`, else the platform
/// config directory, else the working directory.
pub fn config_file_path() -> PathBuf {
    if let Ok(path) = std::env::var("SHIPWATCH_CONFIG") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .map(|d| d.join("shipwatch").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("shipwatch.toml"))
}

impl AppConfig {
    /// Load configuration: defaults, then the TOML file (if present), then
    /// `SHIPWATCH_*` environment overrides (`SHIPWATCH_SERVER__PORT=9000`).
    pub fn load() -> Result<Self> {
        Self::load_from(config_file_path())
    }

    pub fn load_from(path: PathBuf) -> Result<Self> {
        let defaults =
            Config::try_from(&Self::default()).context("failed to encode default configuration")?;
        let config = Config::builder()
            .add_source(defaults)
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("SHIPWATCH").separator("__"))
            .build()
            .context("failed to assemble configuration sources")?;
        config
            .try_deserialize()
            .context("invalid configuration values")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.delivery.max_retries, 3);
        assert_eq!(config.delivery.base_delay_ms, 1000);
        assert!(config.delivery.exponential_backoff);
        assert_eq!(config.session.trailing_results, 20);
        assert!(config.server.scheduled_token.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[server]\nhost = \"0.0.0.0\"\nport = 9977\n\n[delivery]\nmax_retries = 5\nbase_delay_ms = 1000\nexponential_backoff = true\n",
        )
        .unwrap();

        let config = AppConfig::load_from(path).unwrap();
        assert_eq!(config.server.port, 9977);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.delivery.max_retries, 5);
        // Untouched sections keep defaults.
        assert_eq!(config.session.removal_grace_secs, 60);
    }

    #[test]
    fn resolved_database_url_prefers_explicit_value() {
        let config = DatabaseConfig {
            url: "sqlite:/tmp/explicit.db".to_string(),
            max_connections: 10,
        };
        assert_eq!(config.resolved_url(), "sqlite:/tmp/explicit.db");
    }
}
