//! # Structured Logging
//!
//! Subscriber setup and span macros used across the region client and the
//! gateway engine.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{Error, Result};

/// Create a tracing span for a call to a region controller.
///
/// ```rust,ignore
/// let span = region_span!("region-a", "GET", "/v2/show");
/// ```
#[macro_export]
macro_rules! region_span {
    ($region:expr, $method:expr, $path:expr) => {
        tracing::info_span!(
            "region_request",
            region = %$region,
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4()
        )
    };
    ($region:expr, $method:expr, $path:expr, $($field:tt)*) => {
        tracing::info_span!(
            "region_request",
            region = %$region,
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for database operations.
#[macro_export]
macro_rules! db_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::config(format!("Invalid log filter '{}': {}", config.log_level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| Error::config(format!("Failed to install tracing subscriber: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        service_name = %config.observability.service_name,
        connect_timeout_ms = config.region.connect_timeout().as_millis() as u64,
        read_timeout_ms = config.region.read_timeout().as_millis() as u64,
        pool_size = config.region.pool_size,
        retries = config.region.retries,
        fallback_token = config.region.fallback_token.is_some(),
        database_type = "sqlite",
        "regionctl configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = region_span!("region-a", "GET", "/v2/show");
        let _span = region_span!("region-a", "POST", "/v2/tenants/t/envs/e/http-rule", attempt = 1);
        let _span = db_span!("insert_http_rule");
        let _span = db_span!("insert_http_rule", table = "gateway_http_rules");
    }

    #[test]
    fn test_log_config_info() {
        log_config_info(&AppConfig::default());
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        std::env::remove_var("RUST_LOG");
        let config = ObservabilityConfig {
            log_level: "regionctl=notalevel".to_string(),
            ..Default::default()
        };
        assert!(init_logging(&config).is_err());
    }
}
