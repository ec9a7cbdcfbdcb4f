use chrono::{DateTime, Utc};
use thiserror::Error;

/// Certificate and private key problems found while validating gateway TLS material.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// The certificate PEM could not be parsed or contained no certificate.
    #[error("invalid certificate: {reason}")]
    InvalidCert { reason: String },

    /// The private key PEM could not be parsed or uses an unsupported algorithm.
    #[error("invalid private key: {reason}")]
    InvalidPrivateKey { reason: String },

    /// The supplied certificate and key do not match.
    #[error("certificate and private key do not match")]
    CertKeyMismatch,

    /// The certificate is not yet valid.
    #[error("certificate is not valid before {not_before}")]
    CertNotYetValid { not_before: DateTime<Utc> },

    /// The certificate is expired.
    #[error("certificate expired at {not_after}")]
    CertExpired { not_after: DateTime<Utc> },
}

impl CertificateError {
    pub(crate) fn invalid_cert<S: Into<String>>(reason: S) -> Self {
        Self::InvalidCert { reason: reason.into() }
    }

    pub(crate) fn invalid_key<S: Into<String>>(reason: S) -> Self {
        Self::InvalidPrivateKey { reason: reason.into() }
    }
}
