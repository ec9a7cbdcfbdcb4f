//! Domain ID Types with NewType Pattern
//!
//! Type-safe wrappers for gateway identifiers so a rule id cannot be passed
//! where a certificate id is expected. Rule ids are derived deterministically
//! (UUID v5) so that repeated binds of the same target produce the same id.

use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::{Decode, Encode, Sqlite, Type};
use std::fmt;
use uuid::Uuid;

/// Macro to generate NewType ID wrappers with all required traits
macro_rules! domain_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an ID from an existing string (for database retrieval)
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Get the inner string value
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Convert to inner string value
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl Type<Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <String as Type<Sqlite>>::type_info()
            }
        }

        impl<'q> Encode<'q, Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<IsNull, BoxDynError> {
                <String as Encode<'q, Sqlite>>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> Decode<'r, Sqlite> for $name {
            fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
                let s = <String as Decode<'r, Sqlite>>::decode(value)?;
                Ok(Self(s))
            }
        }
    };
}

domain_id!(
    /// Identifier of an HTTP gateway rule, shared with the region controller
    HttpRuleId
);

domain_id!(
    /// Identifier of a TCP/UDP gateway rule, shared with the region controller
    TcpRuleId
);

domain_id!(
    /// Identifier of a gateway TLS certificate
    CertificateId
);

domain_id!(
    /// Identifier of the component (service) a rule routes to
    ComponentId
);

domain_id!(
    /// Identifier of a tenant environment
    EnvId
);

fn derive_uuid(key: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, key.as_bytes()).to_string()
}

impl HttpRuleId {
    /// Derive the rule id for a domain and path. Root-path rules hash the bare
    /// domain; other paths are folded into the key.
    pub fn derive(domain: &str, path: &str) -> Self {
        Self(derive_uuid(&Self::key(domain, path)))
    }

    /// Id of the plain-http twin created next to an https rule by an
    /// `httpandhttps` bind.
    pub fn derive_http_twin(domain: &str, path: &str) -> Self {
        Self(derive_uuid(&format!("{}#http", Self::key(domain, path))))
    }

    fn key(domain: &str, path: &str) -> String {
        if path.is_empty() || path == "/" {
            domain.to_string()
        } else {
            format!("{domain}{path}")
        }
    }
}

impl TcpRuleId {
    /// Derive the rule id for an `ip:port` endpoint.
    pub fn derive(endpoint: &str) -> Self {
        Self(derive_uuid(&format!("tcp:{endpoint}")))
    }
}

impl CertificateId {
    /// Generate a fresh random certificate id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}
