//! Gateway TLS certificates owned by a tenant environment.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{CertificateId, EnvId};

/// A stored certificate with its PEM material decoded.
#[derive(Clone, PartialEq, Serialize)]
pub struct Certificate {
    pub certificate_id: CertificateId,
    pub env_id: EnvId,
    /// Display name, unique within the environment
    pub alias: String,
    /// PEM certificate chain, leaf first
    pub certificate: String,
    #[serde(skip_serializing)]
    pub private_key: String,
    pub certificate_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("certificate_id", &self.certificate_id)
            .field("env_id", &self.env_id)
            .field("alias", &self.alias)
            .field("certificate_type", &self.certificate_type)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Request to register a certificate.
#[derive(Clone)]
pub struct NewCertificate {
    pub alias: String,
    /// Caller-chosen id; generated when absent
    pub certificate_id: Option<CertificateId>,
    pub certificate: String,
    pub private_key: String,
    pub certificate_type: String,
}

impl fmt::Debug for NewCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewCertificate")
            .field("alias", &self.alias)
            .field("certificate_id", &self.certificate_id)
            .field("certificate_type", &self.certificate_type)
            .finish_non_exhaustive()
    }
}

/// Changes to an existing certificate. Absent material keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct CertificateUpdate {
    pub alias: String,
    pub certificate: Option<String>,
    pub private_key: Option<String>,
    pub certificate_type: Option<String>,
}

/// One region that refused a certificate push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanoutFailure {
    pub region_name: String,
    pub error: String,
}

/// Per-region result of pushing certificate material after an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    pub pushed: Vec<String>,
    pub failed: Vec<FanoutFailure>,
}

impl FanoutReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
