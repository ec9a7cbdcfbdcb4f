//! Gateway endpoints of a region controller.
//!
//! [`GatewayApi`] is the seam between the gateway engine and the network: the
//! engine only ever talks to a region through it.

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use super::client::RegionClient;
use crate::domain::{Certificate, GatewayScope, HttpRule, Rewrite, RuleConfig, RuleExtension, RuleTarget, TcpRule};
use crate::errors::{Error, Result};

pub const GATEWAY_PORTS_PATH: &str = "/v2/gateway/ports";
pub const GATEWAY_IPS_PATH: &str = "/v2/gateway/ips";

// ============================================================================
// Wire Bodies
// ============================================================================

/// Body of an HTTP rule bind or update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpRuleBody {
    pub http_rule_id: String,
    pub service_id: String,
    pub tenant_env_id: String,
    pub domain: String,
    pub container_port: u16,
    pub protocol: String,
    pub path: String,
    pub cookie: Option<String>,
    pub header: Option<String>,
    pub weight: u8,
    pub path_rewrite: bool,
    pub rewrites: Vec<Rewrite>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rule_extensions: Vec<RuleExtension>,
    pub certificate: String,
    pub private_key: String,
    pub certificate_name: String,
    pub certificate_id: String,
}

impl HttpRuleBody {
    /// Build the body for a rule, attaching certificate material when given.
    pub fn new(scope: &GatewayScope, rule: &HttpRule, certificate: Option<&Certificate>) -> Self {
        let (certificate, private_key, certificate_name, certificate_id) = match certificate {
            Some(c) => (
                c.certificate.clone(),
                c.private_key.clone(),
                c.alias.clone(),
                c.certificate_id.to_string(),
            ),
            None => Default::default(),
        };

        Self {
            http_rule_id: rule.rule_id.to_string(),
            service_id: rule.component_id.to_string(),
            tenant_env_id: scope.region_tenant_env_id.clone(),
            domain: rule.domain_name.clone(),
            container_port: rule.container_port,
            protocol: rule.protocol.to_string(),
            path: rule.path.clone(),
            cookie: rule.cookie_match.clone(),
            header: rule.header_match.clone(),
            weight: rule.weight,
            path_rewrite: rule.path_rewrite,
            rewrites: rule.rewrites.clone(),
            rule_extensions: rule.rule_extensions.clone(),
            certificate,
            private_key,
            certificate_name,
            certificate_id,
        }
    }
}

/// Body of an HTTP rule delete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpRuleDeleteBody {
    pub http_rule_id: String,
    pub service_id: String,
    pub domain: String,
    pub container_port: u16,
}

impl From<&HttpRule> for HttpRuleDeleteBody {
    fn from(rule: &HttpRule) -> Self {
        Self {
            http_rule_id: rule.rule_id.to_string(),
            service_id: rule.component_id.to_string(),
            domain: rule.domain_name.clone(),
            container_port: rule.container_port,
        }
    }
}

/// Body of a TCP rule bind or update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TcpRuleBody {
    pub tcp_rule_id: String,
    pub service_id: String,
    pub tenant_env_id: String,
    pub container_port: u16,
    pub ip: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rule_extensions: Vec<RuleExtension>,
}

impl TcpRuleBody {
    pub fn new(scope: &GatewayScope, rule: &TcpRule, ip: &str, port: u16) -> Self {
        Self {
            tcp_rule_id: rule.tcp_rule_id.to_string(),
            service_id: rule.component_id.to_string(),
            tenant_env_id: scope.region_tenant_env_id.clone(),
            container_port: rule.container_port,
            ip: ip.to_string(),
            port,
            rule_extensions: rule.rule_extensions.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TcpRuleDeleteBody {
    pub tcp_rule_id: String,
}

/// Proxy parameters of one rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleConfigBody {
    pub rule_id: String,
    pub service_id: String,
    pub tenant_env_id: String,
    pub body: RuleConfig,
}

/// Certificate material pushed to every ingress that references it.
#[derive(Clone, PartialEq, Serialize)]
pub struct CertificateBody {
    pub certificate_id: String,
    pub certificate_name: String,
    pub certificate: String,
    pub private_key: String,
}

impl std::fmt::Debug for CertificateBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBody")
            .field("certificate_id", &self.certificate_id)
            .field("certificate_name", &self.certificate_name)
            .finish_non_exhaustive()
    }
}

impl From<&Certificate> for CertificateBody {
    fn from(certificate: &Certificate) -> Self {
        Self {
            certificate_id: certificate.certificate_id.to_string(),
            certificate_name: certificate.alias.clone(),
            certificate: certificate.certificate.clone(),
            private_key: certificate.private_key.clone(),
        }
    }
}

// ============================================================================
// Gateway API
// ============================================================================

#[async_trait]
pub trait GatewayApi: Send + Sync {
    async fn bind_http_rule(&self, scope: &GatewayScope, body: &HttpRuleBody) -> Result<()>;

    async fn update_http_rule(&self, scope: &GatewayScope, body: &HttpRuleBody) -> Result<()>;

    async fn delete_http_rule(&self, scope: &GatewayScope, body: &HttpRuleDeleteBody) -> Result<()>;

    async fn bind_tcp_rule(&self, scope: &GatewayScope, body: &TcpRuleBody) -> Result<()>;

    async fn update_tcp_rule(&self, scope: &GatewayScope, body: &TcpRuleBody) -> Result<()>;

    async fn delete_tcp_rule(&self, scope: &GatewayScope, body: &TcpRuleDeleteBody) -> Result<()>;

    /// Push certificate material to the ingresses of one region.
    async fn update_certificate(&self, scope: &GatewayScope, body: &CertificateBody) -> Result<()>;

    /// Replace the proxy parameters of an HTTP or TCP rule.
    async fn update_rule_config(
        &self,
        scope: &GatewayScope,
        target: &RuleTarget,
        body: &RuleConfigBody,
    ) -> Result<()>;

    /// Ask the region for a free gateway port, optionally reserving it.
    async fn free_port(&self, region_name: &str, lock: bool) -> Result<u16>;

    /// Addresses the region's gateway listens on.
    async fn gateway_ips(&self, region_name: &str) -> Result<Value>;

    /// Version body reported by the region controller.
    async fn probe(&self, region_name: &str) -> Result<Value>;
}

fn to_body<T: Serialize>(body: &T) -> Result<Value> {
    serde_json::to_value(body)
        .map_err(|e| Error::Serialization { source: e, context: "Failed to encode gateway body".into() })
}

/// Read the port out of a `bean` that may be a number or a numeric string.
pub(crate) fn port_from_bean(bean: Option<&Value>) -> Result<u16> {
    let port = match bean {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    port.and_then(|p| u16::try_from(p).ok())
        .filter(|p| *p > 0)
        .ok_or_else(|| Error::internal(format!("region returned no usable port: {:?}", bean)))
}

#[async_trait]
impl GatewayApi for RegionClient {
    async fn bind_http_rule(&self, scope: &GatewayScope, body: &HttpRuleBody) -> Result<()> {
        let body = to_body(body)?;
        self.call(&scope.region_name, Method::POST, &scope.http_rule_path(), Some(&body)).await?;
        Ok(())
    }

    async fn update_http_rule(&self, scope: &GatewayScope, body: &HttpRuleBody) -> Result<()> {
        let body = to_body(body)?;
        self.call(&scope.region_name, Method::PUT, &scope.http_rule_path(), Some(&body)).await?;
        Ok(())
    }

    async fn delete_http_rule(&self, scope: &GatewayScope, body: &HttpRuleDeleteBody) -> Result<()> {
        let body = to_body(body)?;
        self.call(&scope.region_name, Method::DELETE, &scope.http_rule_path(), Some(&body)).await?;
        Ok(())
    }

    async fn bind_tcp_rule(&self, scope: &GatewayScope, body: &TcpRuleBody) -> Result<()> {
        let body = to_body(body)?;
        self.call(&scope.region_name, Method::POST, &scope.tcp_rule_path(), Some(&body)).await?;
        Ok(())
    }

    async fn update_tcp_rule(&self, scope: &GatewayScope, body: &TcpRuleBody) -> Result<()> {
        let body = to_body(body)?;
        self.call(&scope.region_name, Method::PUT, &scope.tcp_rule_path(), Some(&body)).await?;
        Ok(())
    }

    async fn delete_tcp_rule(&self, scope: &GatewayScope, body: &TcpRuleDeleteBody) -> Result<()> {
        let body = to_body(body)?;
        self.call(&scope.region_name, Method::DELETE, &scope.tcp_rule_path(), Some(&body)).await?;
        Ok(())
    }

    async fn update_certificate(&self, scope: &GatewayScope, body: &CertificateBody) -> Result<()> {
        let body = to_body(body)?;
        self.call(&scope.region_name, Method::PUT, &scope.certificate_path(), Some(&body)).await?;
        Ok(())
    }

    async fn update_rule_config(
        &self,
        scope: &GatewayScope,
        target: &RuleTarget,
        body: &RuleConfigBody,
    ) -> Result<()> {
        let body = to_body(body)?;
        self.call(&scope.region_name, Method::PUT, &scope.rule_config_path(target), Some(&body)).await?;
        Ok(())
    }

    async fn free_port(&self, region_name: &str, lock: bool) -> Result<u16> {
        let path = format!("{}?lock={}", GATEWAY_PORTS_PATH, lock);
        let response = self.call(region_name, Method::GET, &path, None).await?;
        port_from_bean(response.bean())
    }

    async fn gateway_ips(&self, region_name: &str) -> Result<Value> {
        let response = self.call(region_name, Method::GET, GATEWAY_IPS_PATH, None).await?;
        Ok(response.unpack())
    }

    async fn probe(&self, region_name: &str) -> Result<Value> {
        RegionClient::probe(self, region_name).await
    }
}
