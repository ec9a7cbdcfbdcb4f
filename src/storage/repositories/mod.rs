//! # Repositories
//!
//! Repository traits consumed by the gateway engine and the region client,
//! each with a SQLite implementation.

pub mod certificate;
pub mod component_port;
pub mod env_region;
pub mod http_rule;
pub mod region;
pub mod rule_config;
pub mod tcp_rule;

pub use certificate::{CertificateRepository, SqlxCertificateRepository};
pub use component_port::{ComponentPortRepository, SqlxComponentPortRepository};
pub use env_region::{EnvRegionRepository, SqlxEnvRegionRepository};
pub use http_rule::{HttpRuleRepository, SqlxHttpRuleRepository};
pub use region::{RegionEndpointRegistry, SqlxRegionRepository};
pub use rule_config::{RuleConfigRepository, SqlxRuleConfigRepository};
pub use tcp_rule::{SqlxTcpRuleRepository, TcpRuleRepository};

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::errors::{Error, Result, ValidationError};

/// Parse a timestamp stored as RFC 3339 (application-written) or in SQLite's
/// `datetime('now')` format.
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    Err(Error::internal(format!("Invalid timestamp format: {}", s)))
}

/// Map a write error, turning unique-constraint violations into a duplicate-rule rejection.
pub(crate) fn map_write_error(e: sqlx::Error, detail: &str, context: String) -> Error {
    let unique = e.as_database_error().is_some_and(|db| db.is_unique_violation());
    if unique {
        ValidationError::DuplicateRule { detail: detail.to_string() }.into()
    } else {
        Error::database(e, context)
    }
}

pub(crate) fn to_json_text<T: serde::Serialize>(value: &T, context: &str) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Serialization { source: e, context: context.to_string() })
}

pub(crate) fn from_json_text<T: serde::de::DeserializeOwned>(text: &str, context: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| Error::Serialization { source: e, context: context.to_string() })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-03-01T10:00:00+00:00").is_ok());
        assert!(parse_timestamp("2024-03-01 10:00:00").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
