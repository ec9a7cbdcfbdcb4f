//! # Utilities
//!
//! Certificate parsing and matching helpers.

pub mod certificates;

pub use certificates::{covers, describe, sans_of, validate, validate_at, CertificateInfo};
