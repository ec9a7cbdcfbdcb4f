//! # Storage and Persistence
//!
//! SQLite-backed persistence for region connection records and the local
//! copy of gateway rules and certificates.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use crate::config::DatabaseConfig;

pub use migrations::{get_migration_version, run_migrations};
pub use pool::{check_connection, create_pool, DbPool};
pub use repositories::{
    CertificateRepository, ComponentPortRepository, EnvRegionRepository, HttpRuleRepository,
    RegionEndpointRegistry, RuleConfigRepository, SqlxCertificateRepository,
    SqlxComponentPortRepository, SqlxEnvRegionRepository, SqlxHttpRuleRepository,
    SqlxRegionRepository, SqlxRuleConfigRepository, SqlxTcpRuleRepository, TcpRuleRepository,
};
