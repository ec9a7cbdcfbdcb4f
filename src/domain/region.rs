//! Region connection descriptors and the tenant/environment scope a gateway
//! operation runs in.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ComponentId, EnvId, RuleTarget};

/// Connection descriptor for one region controller. Resolved fresh for every
/// operation so token rotation is picked up without a restart.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionEndpoint {
    pub region_name: String,
    pub base_url: String,
    /// Value sent verbatim in the `Authorization` header. Empty means "use the
    /// configured fallback token".
    pub bearer_token: String,
    pub verify_tls: bool,
    /// CA bundle, PEM text or a path to a PEM file
    pub ca_cert: Option<String>,
    /// Client certificate for mTLS, PEM text or a path
    pub client_cert: Option<String>,
    /// Client private key for mTLS, PEM text or a path
    pub client_key: Option<String>,
    /// Wildcard domain the region's gateway serves HTTP rules under
    pub http_domain: Option<String>,
    /// Address the region's gateway exposes TCP rules on
    pub tcp_domain: Option<String>,
}

impl RegionEndpoint {
    pub fn new<N: Into<String>, U: Into<String>>(region_name: N, base_url: U) -> Self {
        Self {
            region_name: region_name.into(),
            base_url: base_url.into(),
            bearer_token: String::new(),
            verify_tls: true,
            ca_cert: None,
            client_cert: None,
            client_key: None,
            http_domain: None,
            tcp_domain: None,
        }
    }

    pub fn with_token<S: Into<String>>(mut self, token: S) -> Self {
        self.bearer_token = token.into();
        self
    }

    /// Join a request path onto the base URL without doubling slashes.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// True when both halves of a client identity are configured.
    pub fn has_client_identity(&self) -> bool {
        self.client_cert.as_deref().is_some_and(|c| !c.is_empty())
            && self.client_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl fmt::Debug for RegionEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionEndpoint")
            .field("region_name", &self.region_name)
            .field("base_url", &self.base_url)
            .field("bearer_token", &if self.bearer_token.is_empty() { "" } else { "<redacted>" })
            .field("verify_tls", &self.verify_tls)
            .field("ca_cert", &self.ca_cert.as_ref().map(|_| "<set>"))
            .field("client_cert", &self.client_cert.as_ref().map(|_| "<set>"))
            .field("client_key", &self.client_key.as_ref().map(|_| "<redacted>"))
            .field("http_domain", &self.http_domain)
            .finish()
    }
}

/// Tenant environment a gateway operation applies to, and the region that
/// serves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayScope {
    pub tenant_name: String,
    pub env_name: String,
    pub env_id: EnvId,
    pub region_name: String,
    /// The environment's id as known to the region controller
    pub region_tenant_env_id: String,
}

impl GatewayScope {
    pub fn http_rule_path(&self) -> String {
        format!("/v2/tenants/{}/envs/{}/http-rule", self.tenant_name, self.env_name)
    }

    pub fn tcp_rule_path(&self) -> String {
        format!("/v2/tenants/{}/envs/{}/tcp-rule", self.tenant_name, self.env_name)
    }

    pub fn certificate_path(&self) -> String {
        format!("/v2/tenants/{}/envs/{}/gateway/certificate", self.tenant_name, self.env_name)
    }

    /// Where the proxy parameters of an HTTP or TCP rule are set.
    pub fn rule_config_path(&self, target: &RuleTarget) -> String {
        let resource = match target {
            RuleTarget::Http(_) => "rule-config",
            RuleTarget::Tcp(_) => "tcp-rule-config",
        };
        format!("/v2/tenants/{}/envs/{}/{}", self.tenant_name, self.env_name, resource)
    }

    /// Same environment served by another region.
    pub fn in_region<S: Into<String>>(&self, region_name: S) -> Self {
        Self { region_name: region_name.into(), ..self.clone() }
    }
}

/// The component a rule routes traffic to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRef {
    pub component_id: ComponentId,
    /// Short alias used in default hostnames
    pub component_alias: String,
}

impl ComponentRef {
    pub fn new<I: Into<ComponentId>, A: Into<String>>(component_id: I, component_alias: A) -> Self {
        Self { component_id: component_id.into(), component_alias: component_alias.into() }
    }
}
