//! Business logic services
//!
//! The gateway rule engine, built on the region client and the repositories.

pub mod gateway_sync;

pub use gateway_sync::{
    CertificateUpdateResult, DefaultRule, GatewayRepositories, GatewayRuleSyncEngine, RemovedRules,
};
