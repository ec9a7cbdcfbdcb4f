//! # Validation
//!
//! Syntax checks run locally before any gateway rule reaches a region.

pub mod domain;
pub mod header;

pub use domain::{validate_domain_name, MAX_DOMAIN_LENGTH};
pub use header::{validate_header_key, validate_set_headers};
