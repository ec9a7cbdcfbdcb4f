//! # Error Handling
//!
//! Error taxonomy for region calls, gateway rule synchronization and local
//! validation. Remote failures keep their original cause for diagnostics while
//! [`Error::user_message`] gives callers a stable text to present.

pub mod tls;
pub mod types;

pub use tls::CertificateError;
pub use types::{Error, ExhaustedResource, Result, TransportErrorKind, ValidationError, CLUSTER_COMMUNICATION_ERROR};
