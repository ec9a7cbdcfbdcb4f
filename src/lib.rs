//! # regionctl
//!
//! Client core for a multi-region container platform console. It talks to
//! per-region controller APIs over pooled, TLS-configurable HTTP connections
//! and keeps gateway rules (HTTP domains, TCP/UDP endpoints, certificates) in
//! sync between the region and the local store.
//!
//! ## Architecture
//!
//! ```text
//! GatewayRuleSyncEngine ──► GatewayApi ──► RegionClient ──► RequestExecutor ──► ConnectionPoolManager
//!         │                                     │
//!         ▼                                     ▼
//!    repositories (sqlx)              RegionEndpointRegistry
//!
//! ReverseProxyForwarder ──► RegionClient
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use regionctl::{config::AppConfig, region::RegionClient, storage, Result};
//!
//! # async fn run() -> Result<()> {
//! let config = AppConfig::from_env();
//! let pool = storage::create_pool(&config.database).await?;
//! let regions = Arc::new(storage::SqlxRegionRepository::new(pool));
//! let client = RegionClient::new(regions, config.region.clone());
//! let version = client.probe("region-a").await?;
//! println!("{version}");
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod region;
pub mod services;
pub mod storage;
pub mod utils;
pub mod validation;

pub use config::AppConfig;
pub use errors::{Error, Result};
pub use region::{RegionClient, ReverseProxyForwarder};
pub use services::GatewayRuleSyncEngine;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
