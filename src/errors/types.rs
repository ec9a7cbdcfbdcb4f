//! # Error Types
//!
//! Region, gateway and storage error types built on `thiserror`.

use std::fmt;

use serde_json::Value;

use super::tls::CertificateError;

/// Custom result type for regionctl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message shown to end users for any remote or transport failure.
pub const CLUSTER_COMMUNICATION_ERROR: &str = "cluster communication error, retry later";

/// Main error type
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No region registered under the requested name
    #[error("region not found: {region}")]
    RegionNotFound { region: String },

    /// Transport-level failure talking to a region controller
    #[error("{kind}: {method} {url}: {message}")]
    Transport {
        kind: TransportErrorKind,
        method: String,
        url: String,
        message: String,
    },

    /// HTTP 409 from the region controller
    #[error("API call too frequent: {method} {url}")]
    RemoteBusy { method: String, url: String },

    /// The region rejected the call with a business error code
    #[error("region returned error code {code}: {message}")]
    RemoteCoded {
        status: u16,
        code: i64,
        message: String,
    },

    /// Any other 4xx/5xx from the region controller
    #[error("remote call failed: {method} {url} returned {status}: {body}")]
    RemoteRejected {
        status: u16,
        method: String,
        url: String,
        body: Value,
    },

    /// The region answered an error status with an empty or undecodable body
    #[error("malformed region response: {method} {url} returned {status}: {raw}")]
    MalformedResponse {
        status: u16,
        method: String,
        url: String,
        raw: String,
    },

    /// The region's license rejected the call
    #[error("invalid license")]
    InvalidLicense,

    /// The cluster or tenant ran out of memory quota
    #[error("{kind}")]
    ResourceExhausted { kind: ExhaustedResource },

    /// Local validation failed before any remote call was made
    #[error(transparent)]
    LocalValidation(#[from] ValidationError),

    /// Resource not found locally
    #[error("{resource_type} not found: {id}")]
    NotFound { resource_type: String, id: String },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Transport failure subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// TLS handshake or certificate verification failed; the pooled client is evicted
    Tls,
    /// Connect or read deadline elapsed
    Timeout,
    /// Bounded retries exhausted; the pooled client is evicted
    MaxRetries,
    /// Connection could not be established
    Connect,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Tls => write!(f, "TLS error retry later"),
            TransportErrorKind::Timeout => write!(f, "request timed out"),
            TransportErrorKind::MaxRetries => write!(f, "max retries exceeded"),
            TransportErrorKind::Connect => write!(f, "connection failed"),
            TransportErrorKind::Other => write!(f, "transport error"),
        }
    }
}

/// Which memory quota a 412 response reported as exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustedResource {
    ClusterMemory,
    TenantMemory,
}

impl ExhaustedResource {
    /// Parse the `msg` marker the region controller uses for memory exhaustion.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "cluster_lack_of_memory" => Some(Self::ClusterMemory),
            "tenant_lack_of_memory" => Some(Self::TenantMemory),
            _ => None,
        }
    }
}

impl fmt::Display for ExhaustedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExhaustedResource::ClusterMemory => write!(f, "cluster lack of memory"),
            ExhaustedResource::TenantMemory => write!(f, "tenant lack of memory"),
        }
    }
}

/// Local rejections raised before the region controller is contacted.
#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("invalid domain '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("domain '{domain}' is not covered by certificate '{certificate}'")]
    DomainNotCovered { domain: String, certificate: String },

    #[error("gateway rule already exists: {detail}")]
    DuplicateRule { detail: String },

    #[error("certificate name already exists: {alias}")]
    CertificateAliasExists { alias: String },

    #[error("the certificate still has http rules: {certificate_id}")]
    CertificateInUse { certificate_id: String },

    #[error("invalid endpoint '{endpoint}': expected ip:port")]
    InvalidEndpoint { endpoint: String },

    #[error("protocol httpandhttps requires a certificate")]
    MissingCertificate,

    #[error("forbidden key: {key}")]
    ForbiddenHeaderKey { key: String },

    #[error("{field}: {message}")]
    Field { field: String, message: String },

    #[error(transparent)]
    Certificate(#[from] CertificateError),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a field validation error
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::LocalValidation(ValidationError::Field {
            field: field.into(),
            message: message.into(),
        })
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a region not found error
    pub fn region_not_found<S: Into<String>>(region: S) -> Self {
        Self::RegionNotFound { region: region.into() }
    }

    /// Create a transport error
    pub fn transport<M: Into<String>, U: Into<String>, S: Into<String>>(
        kind: TransportErrorKind,
        method: M,
        url: U,
        message: S,
    ) -> Self {
        Self::Transport {
            kind,
            method: method.into(),
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a database error with context
    pub fn database<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Database { source, context: context.into() }
    }

    /// HTTP status a façade should answer with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RegionNotFound { .. } => 404,
            Error::Transport { kind: TransportErrorKind::Timeout, .. } => 504,
            Error::Transport { .. } => 502,
            Error::RemoteBusy { .. } => 409,
            Error::RemoteCoded { status, .. } => *status,
            Error::RemoteRejected { status, .. } => *status,
            Error::MalformedResponse { .. } => 502,
            Error::InvalidLicense => 401,
            Error::ResourceExhausted { .. } => 412,
            Error::LocalValidation(ValidationError::DuplicateRule { .. })
            | Error::LocalValidation(ValidationError::CertificateAliasExists { .. }) => 409,
            Error::LocalValidation(_) => 400,
            Error::NotFound { .. } => 404,
            Error::Serialization { .. } => 400,
            Error::Database { .. }
            | Error::Io { .. }
            | Error::Config { .. }
            | Error::Internal { .. } => 500,
        }
    }

    /// Check if the caller may retry this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::RemoteBusy { .. })
    }

    /// True when the region controller answered 404 for the resource.
    pub fn is_remote_not_found(&self) -> bool {
        matches!(
            self,
            Error::RemoteRejected { status: 404, .. }
                | Error::RemoteCoded { status: 404, .. }
                | Error::MalformedResponse { status: 404, .. }
        )
    }

    /// True for failures produced by talking to a region rather than by local checks.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. }
                | Error::RemoteBusy { .. }
                | Error::RemoteCoded { .. }
                | Error::RemoteRejected { .. }
                | Error::MalformedResponse { .. }
        )
    }

    /// Text safe to present to an end user. Remote and transport failures collapse
    /// into a generic message; the full error is kept for logs.
    pub fn user_message(&self) -> String {
        match self {
            Error::RemoteCoded { message, .. } => message.clone(),
            Error::RemoteBusy { .. } => "API call too frequent, retry later".to_string(),
            e if e.is_remote() => CLUSTER_COMMUNICATION_ERROR.to_string(),
            Error::Database { .. } | Error::Io { .. } | Error::Internal { .. } => {
                "internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<CertificateError> for Error {
    fn from(error: CertificateError) -> Self {
        Self::LocalValidation(ValidationError::Certificate(error))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Validation failed: {}", message))
    }
}
