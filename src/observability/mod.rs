//! # Observability
//!
//! Structured logging through `tracing` and counters through `metrics`.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info};
