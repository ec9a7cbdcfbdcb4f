//! Gateway rule records and the requests that create or change them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CertificateId, ComponentId, ComponentRef, EnvId, HttpRuleId, TcpRuleId};
use crate::errors::ValidationError;

pub const DEFAULT_RULE_PATH: &str = "/";
pub const DEFAULT_RULE_WEIGHT: u8 = 100;

/// Protocol requested for an HTTP rule. Persisted rows are always `Http` or
/// `Https`; `HttpAndHttps` only appears as a bind request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpProtocol {
    Http,
    Https,
    #[serde(rename = "httpandhttps")]
    HttpAndHttps,
}

impl HttpProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpProtocol::Http => "http",
            HttpProtocol::Https => "https",
            HttpProtocol::HttpAndHttps => "httpandhttps",
        }
    }
}

impl fmt::Display for HttpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpProtocol {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(HttpProtocol::Http),
            "https" => Ok(HttpProtocol::Https),
            "httpandhttps" => Ok(HttpProtocol::HttpAndHttps),
            other => Err(ValidationError::Field {
                field: "protocol".into(),
                message: format!("unsupported http protocol '{other}'"),
            }),
        }
    }
}

/// Protocol of a stream (TCP/UDP) rule, taken from the component's declared port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamProtocol {
    #[default]
    Tcp,
    Udp,
    Mysql,
    Grpc,
}

impl StreamProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamProtocol::Tcp => "tcp",
            StreamProtocol::Udp => "udp",
            StreamProtocol::Mysql => "mysql",
            StreamProtocol::Grpc => "grpc",
        }
    }

    /// Map a declared port protocol onto a stream protocol, defaulting to tcp.
    pub fn from_declared(declared: Option<&str>) -> Self {
        match declared.map(str::to_ascii_lowercase).as_deref() {
            Some("udp") => StreamProtocol::Udp,
            Some("mysql") => StreamProtocol::Mysql,
            Some("grpc") => StreamProtocol::Grpc,
            _ => StreamProtocol::Tcp,
        }
    }
}

impl fmt::Display for StreamProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form key/value extension understood by the region gateway
/// (e.g. `lb-type`, `httpToHttps`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleExtension {
    pub key: String,
    pub value: String,
}

/// Path rewrite applied by the gateway before forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewrite {
    pub regex: String,
    pub replacement: String,
    #[serde(default)]
    pub flag: String,
}

/// A persisted HTTP/HTTPS gateway rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRule {
    pub rule_id: HttpRuleId,
    pub component_id: ComponentId,
    pub env_id: EnvId,
    pub region_name: String,
    pub container_port: u16,
    pub domain_name: String,
    pub protocol: HttpProtocol,
    pub certificate_id: Option<CertificateId>,
    pub path: String,
    pub cookie_match: Option<String>,
    pub header_match: Option<String>,
    pub weight: u8,
    pub path_rewrite: bool,
    pub rewrites: Vec<Rewrite>,
    pub rule_extensions: Vec<RuleExtension>,
    /// False only for the platform-generated default hostname
    pub is_custom: bool,
    /// Uses path, cookie or header matching
    pub is_senior: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HttpRule {
    /// Whether two rules would claim the same traffic.
    pub fn conflicts_with(&self, other: &HttpRule) -> bool {
        self.component_id == other.component_id
            && self.container_port == other.container_port
            && self.domain_name == other.domain_name
            && self.protocol == other.protocol
            && self.path == other.path
    }

    pub(crate) fn compute_is_senior(
        path: &str,
        cookie_match: Option<&str>,
        header_match: Option<&str>,
    ) -> bool {
        path != DEFAULT_RULE_PATH
            || cookie_match.is_some_and(|c| !c.is_empty())
            || header_match.is_some_and(|h| !h.is_empty())
    }
}

/// A persisted TCP/UDP gateway rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpRule {
    pub tcp_rule_id: TcpRuleId,
    pub component_id: ComponentId,
    pub env_id: EnvId,
    pub region_name: String,
    pub container_port: u16,
    /// `ip:port` the gateway listens on
    pub endpoint: String,
    pub protocol: StreamProtocol,
    pub rule_extensions: Vec<RuleExtension>,
    /// True when the endpoint port differs from the platform-assigned default
    pub is_custom: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A parsed `ip:port` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidEndpoint { endpoint: s.to_string() };
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let (ip, port) = compact.rsplit_once(':').ok_or_else(invalid)?;
        if ip.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }
        Ok(Endpoint { ip: ip.to_string(), port })
    }
}

/// Outcome of an idempotent remote delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The region deleted the rule
    Deleted,
    /// The region no longer had the rule; local state was still removed
    NotFoundTreatedAsOk,
}

/// Outcome of a TCP rule update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The region did not know the rule; the local row was replaced anyway
    RemoteMissingReplaced,
}

/// Request to bind a domain to a component port.
#[derive(Debug, Clone)]
pub struct BindHttpRule {
    pub component: ComponentRef,
    pub container_port: u16,
    pub domain_name: String,
    pub protocol: HttpProtocol,
    pub certificate_id: Option<CertificateId>,
    pub path: Option<String>,
    pub cookie_match: Option<String>,
    pub header_match: Option<String>,
    pub weight: Option<u8>,
    pub path_rewrite: bool,
    pub rewrites: Vec<Rewrite>,
    pub rule_extensions: Vec<RuleExtension>,
}

impl BindHttpRule {
    pub fn new<D: Into<String>>(component: ComponentRef, container_port: u16, domain_name: D) -> Self {
        Self {
            component,
            container_port,
            domain_name: domain_name.into(),
            protocol: HttpProtocol::Http,
            certificate_id: None,
            path: None,
            cookie_match: None,
            header_match: None,
            weight: None,
            path_rewrite: false,
            rewrites: Vec::new(),
            rule_extensions: Vec::new(),
        }
    }

    pub fn with_certificate(mut self, protocol: HttpProtocol, certificate_id: CertificateId) -> Self {
        self.protocol = protocol;
        self.certificate_id = Some(certificate_id);
        self
    }

    pub fn with_path<S: Into<String>>(mut self, path: S) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Partial update of an HTTP rule. `None` leaves a field unchanged; the
/// nested options clear a field when set to `Some(None)`.
#[derive(Debug, Clone, Default)]
pub struct UpdateHttpRule {
    pub domain_name: Option<String>,
    pub certificate_id: Option<Option<CertificateId>>,
    pub path: Option<String>,
    pub cookie_match: Option<Option<String>>,
    pub header_match: Option<Option<String>>,
    pub weight: Option<u8>,
    pub path_rewrite: Option<bool>,
    pub rewrites: Option<Vec<Rewrite>>,
    pub rule_extensions: Option<Vec<RuleExtension>>,
}

/// Request to bind an `ip:port` endpoint to a component port.
#[derive(Debug, Clone)]
pub struct BindTcpRule {
    pub component: ComponentRef,
    pub container_port: u16,
    pub endpoint: String,
    /// Port the platform assigned to this component port
    pub default_port: u16,
    pub rule_extensions: Vec<RuleExtension>,
}

/// Replacement values for an existing TCP rule.
#[derive(Debug, Clone)]
pub struct UpdateTcpRule {
    pub endpoint: String,
    pub container_port: Option<u16>,
    pub default_port: u16,
    pub rule_extensions: Option<Vec<RuleExtension>>,
}

/// A request header the gateway sets before proxying to the component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSetting {
    pub item_key: String,
    pub item_value: String,
}

impl HeaderSetting {
    pub fn new<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self { item_key: key.into(), item_value: value.into() }
    }
}

/// Proxy parameters attached to one gateway rule.
///
/// Only `set_headers` is interpreted locally. Timeouts, buffering and the
/// other parameters are relayed to the region as given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub set_headers: Vec<HeaderSetting>,
    #[serde(flatten)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

/// The rule a configuration applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleTarget {
    Http(HttpRuleId),
    Tcp(TcpRuleId),
}

impl RuleTarget {
    pub fn rule_id(&self) -> &str {
        match self {
            Self::Http(id) => id.as_str(),
            Self::Tcp(id) => id.as_str(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Tcp(_) => "tcp",
        }
    }
}
