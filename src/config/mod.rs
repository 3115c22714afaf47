//! Configuration for the ICU receiver.
//!
//! YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Database settings (driver, DSN, pool size)
//! - Resilience settings (circuit breaker, retry)

mod app;
mod validation;

pub use app::{AppConfig, DEFAULT_DSN, DatabaseConfig, DatabaseDriver, ServerConfig};
pub use validation::{ConfigError, expand_env_vars};
