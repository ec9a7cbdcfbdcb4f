//! # Configuration Settings
//!
//! Defines the configuration structure for the region client and its stores.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// Region client configuration
    #[validate(nested)]
    pub region: RegionClientConfig,

    /// Database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load every section from environment variables
    pub fn from_env() -> Self {
        Self {
            region: RegionClientConfig::from_env(),
            database: DatabaseConfig::from_env(),
            observability: ObservabilityConfig::from_env(),
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        if !self.database.is_sqlite() {
            return Err(Error::config("Database URL must start with 'sqlite:'"));
        }

        Ok(())
    }
}

/// Timeouts, pool sizing and credentials for calls to region controllers
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegionClientConfig {
    /// Connect timeout in seconds
    #[validate(range(
        min = 0.1,
        max = 120.0,
        message = "Connect timeout must be between 0.1 and 120 seconds"
    ))]
    pub connect_timeout_seconds: f64,

    /// Read timeout in seconds
    #[validate(range(
        min = 0.1,
        max = 600.0,
        message = "Read timeout must be between 0.1 and 600 seconds"
    ))]
    pub read_timeout_seconds: f64,

    /// Idle connections kept per pooled client
    #[validate(range(min = 1, max = 1000, message = "Pool size must be between 1 and 1000"))]
    pub pool_size: usize,

    /// Retries applied to a single region call
    #[validate(range(max = 10, message = "Retries must be at most 10"))]
    pub retries: u32,

    /// Authorization token used when a region has none configured
    pub fallback_token: Option<String>,

    /// Timeout for reverse-proxied requests in seconds
    #[validate(range(
        min = 1,
        max = 600,
        message = "Proxy timeout must be between 1 and 600 seconds"
    ))]
    pub proxy_timeout_seconds: u64,
}

impl Default for RegionClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: 2.0,
            read_timeout_seconds: 5.0,
            pool_size: 20,
            retries: 3,
            fallback_token: None,
            proxy_timeout_seconds: 20,
        }
    }
}

impl RegionClientConfig {
    /// Create RegionClientConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let connect_timeout_seconds = std::env::var("REGION_CONNECTION_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(defaults.connect_timeout_seconds);

        // The variable name is historical and kept for deployment compatibility.
        let read_timeout_seconds = std::env::var("REGION_RED_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(defaults.read_timeout_seconds);

        let pool_size = std::env::var("CLIENT_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.pool_size);

        let retries = std::env::var("REGION_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.retries);

        let fallback_token = std::env::var("REGION_TOKEN").ok().filter(|s| !s.is_empty());

        let proxy_timeout_seconds = std::env::var("REGION_PROXY_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.proxy_timeout_seconds);

        Self {
            connect_timeout_seconds,
            read_timeout_seconds,
            pool_size,
            retries,
            fallback_token,
            proxy_timeout_seconds,
        }
    }

    /// Get connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.connect_timeout_seconds)
    }

    /// Get read timeout as Duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.read_timeout_seconds)
    }

    /// Get proxy timeout as Duration
    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy_timeout_seconds)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(
        min = 1,
        max = 100,
        message = "Max connections must be between 1 and 100"
    ))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(max = 50, message = "Min connections must be at most 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/regionctl.db".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Single-connection in-memory database, for tests and dry runs
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            idle_timeout_seconds: 0,
            ..Default::default()
        }
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// Check if this is a SQLite configuration
    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite:")
    }

    /// Create DatabaseConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let url = std::env::var("DATABASE_URL").unwrap_or(defaults.url);

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.max_connections);

        let min_connections = std::env::var("DATABASE_MIN_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.min_connections);

        let connect_timeout_seconds = std::env::var("DATABASE_CONNECT_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.connect_timeout_seconds);

        let idle_timeout_seconds = std::env::var("DATABASE_IDLE_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.idle_timeout_seconds);

        let auto_migrate = std::env::var("DATABASE_AUTO_MIGRATE")
            .map(|s| s.to_lowercase() == "true" || s == "1")
            .unwrap_or(defaults.auto_migrate);

        Self {
            url,
            max_connections,
            min_connections,
            connect_timeout_seconds,
            idle_timeout_seconds,
            auto_migrate,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Service name attached to log output
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "regionctl".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    /// Create ObservabilityConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let service_name =
            std::env::var("REGIONCTL_SERVICE_NAME").unwrap_or(defaults.service_name);

        let log_level = std::env::var("REGIONCTL_LOG_LEVEL").unwrap_or(defaults.log_level);

        let json_logging = std::env::var("REGIONCTL_JSON_LOGS")
            .map(|s| s.to_lowercase() == "true" || s == "1")
            .unwrap_or(defaults.json_logging);

        Self { service_name, log_level, json_logging }
    }
}
