//! Application configuration structures.

use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::resilience::ResilienceConfig;
use crate::storage::db::DEFAULT_MAX_CONNECTIONS;

use super::validation::{ConfigError, expand_env_vars};

/// Default SQLite DSN; `mode=rwc` creates the file on first start.
pub const DEFAULT_DSN: &str = "sqlite:data/icu.db?mode=rwc";

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_dsn() -> String {
    DEFAULT_DSN.to_string()
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8080).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Storage backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub driver: DatabaseDriver,

    /// sqlx connection URL, ignored by the `memory` driver.
    #[serde(default = "default_dsn")]
    pub dsn: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            dsn: default_dsn(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    /// Circuit breaker and retry settings for the storage boundary.
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` are expanded before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(&expand_env_vars(content))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        if self.database.driver == DatabaseDriver::Sqlite && self.database.dsn.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database dsn must be set for the sqlite driver".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database max_connections must be positive".to_string(),
            ));
        }

        self.validate_resilience()
    }

    fn validate_resilience(&self) -> Result<(), ConfigError> {
        let cb = &self.resilience.circuit_breaker;
        let retry = &self.resilience.retry;

        if !(0.0..100.0).contains(&cb.failure_rate_threshold) {
            return Err(ConfigError::ValidationError(format!(
                "circuit_breaker failure_rate_threshold must be in [0, 100), got {}",
                cb.failure_rate_threshold
            )));
        }

        if cb.sliding_window_size == 0 {
            return Err(ConfigError::ValidationError(
                "circuit_breaker sliding_window_size must be positive".to_string(),
            ));
        }

        if cb.minimum_number_of_calls == 0 || cb.minimum_number_of_calls > cb.sliding_window_size {
            return Err(ConfigError::ValidationError(format!(
                "circuit_breaker minimum_number_of_calls must be in 1..={}, got {}",
                cb.sliding_window_size, cb.minimum_number_of_calls
            )));
        }

        if cb.permitted_calls_in_half_open_state == 0 {
            return Err(ConfigError::ValidationError(
                "circuit_breaker permitted_calls_in_half_open_state must be positive".to_string(),
            ));
        }

        if retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }

        if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "retry backoff_multiplier must be >= 1.0, got {}",
                retry.backoff_multiplier
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.database.dsn, DEFAULT_DSN);
        assert_eq!(config.resilience.retry.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_full() {
        let yaml = r#"
server:
  bind: "127.0.0.1"
  port: 9090
database:
  driver: memory
resilience:
  circuit_breaker:
    failure_rate_threshold: 25.0
    sliding_window_size: 20
    minimum_number_of_calls: 5
    wait_duration_in_open_state: 30s
    permitted_calls_in_half_open_state: 3
  retry:
    max_attempts: 5
    wait_duration: 250ms
    backoff_multiplier: 2.0
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.driver, DatabaseDriver::Memory);
        let cb = &config.resilience.circuit_breaker;
        assert_eq!(cb.sliding_window_size, 20);
        assert_eq!(cb.wait_duration_in_open_state, Duration::from_secs(30));
        assert_eq!(config.resilience.retry.wait_duration, Duration::from_millis(250));
    }

    #[test]
    fn test_from_yaml_expands_env_defaults() {
        let yaml = r#"
server:
  port: ${ICU_TEST_UNSET_PORT_4711:-7070}
database:
  dsn: "${ICU_TEST_UNSET_DSN_4711:-sqlite::memory:}"
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 7070);
        assert_eq!(config.database.dsn, "sqlite::memory:");
    }

    #[test]
    fn test_invalid_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_bind_address() {
        let mut config = AppConfig::default();
        config.server.bind = "not-an-ip".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invalid server bind address"));
    }

    #[test]
    fn test_invalid_threshold() {
        let mut config = AppConfig::default();
        config.resilience.circuit_breaker.failure_rate_threshold = 100.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_minimum_calls_cannot_exceed_window() {
        let mut config = AppConfig::default();
        config.resilience.circuit_breaker.sliding_window_size = 5;
        config.resilience.circuit_breaker.minimum_number_of_calls = 6;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("minimum_number_of_calls"));
    }

    #[test]
    fn test_zero_retry_attempts_rejected() {
        let mut config = AppConfig::default();
        config.resilience.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_driver_is_parse_error() {
        let err = AppConfig::from_yaml("database:\n  driver: duckdb\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
