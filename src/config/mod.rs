//! # Configuration Management
//!
//! Environment-driven configuration. Every section has defaults suited to
//! intra-cluster calls and can be overridden through environment variables
//! (optionally loaded from a `.env` file by the binary).

pub mod settings;

pub use settings::{AppConfig, DatabaseConfig, ObservabilityConfig, RegionClientConfig};
