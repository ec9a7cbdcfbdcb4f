//! # Gateway Rule Synchronization
//!
//! Keeps the gateway rules a region serves and the local record of them in
//! step. Mutating operations run in a fixed order:
//!
//! 1. local checks (domain syntax, certificate coverage, duplicates)
//! 2. the region call
//! 3. the local write
//!
//! A failure at any step leaves the local record as it was before the call.
//! Local checks never reach the region.

mod certificate;
mod http;
mod rule_config;
mod tcp;

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    Certificate, ComponentId, ComponentRef, DeleteOutcome, FanoutReport, GatewayScope, HttpProtocol,
    HttpRule, HttpRuleId, StreamProtocol, TcpRule, TcpRuleId, DEFAULT_RULE_PATH, DEFAULT_RULE_WEIGHT,
};
use crate::errors::{Error, Result};
use crate::observability::metrics::record_gateway_sync;
use crate::region::GatewayApi;
use crate::storage::{
    CertificateRepository, ComponentPortRepository, DbPool, EnvRegionRepository, HttpRuleRepository,
    RegionEndpointRegistry, RuleConfigRepository, SqlxCertificateRepository,
    SqlxComponentPortRepository, SqlxEnvRegionRepository, SqlxHttpRuleRepository,
    SqlxRuleConfigRepository, SqlxTcpRuleRepository, TcpRuleRepository,
};

/// Address default stream rules listen on.
const DEFAULT_STREAM_IP: &str = "0.0.0.0";

/// Repositories the engine reads and writes.
#[derive(Clone)]
pub struct GatewayRepositories {
    pub http_rules: Arc<dyn HttpRuleRepository>,
    pub tcp_rules: Arc<dyn TcpRuleRepository>,
    pub certificates: Arc<dyn CertificateRepository>,
    pub env_regions: Arc<dyn EnvRegionRepository>,
    pub component_ports: Arc<dyn ComponentPortRepository>,
    pub rule_configs: Arc<dyn RuleConfigRepository>,
}

impl GatewayRepositories {
    /// SQLite-backed repositories sharing one pool.
    pub fn sqlx(pool: DbPool) -> Self {
        Self {
            http_rules: Arc::new(SqlxHttpRuleRepository::new(pool.clone())),
            tcp_rules: Arc::new(SqlxTcpRuleRepository::new(pool.clone())),
            certificates: Arc::new(SqlxCertificateRepository::new(pool.clone())),
            env_regions: Arc::new(SqlxEnvRegionRepository::new(pool.clone())),
            component_ports: Arc::new(SqlxComponentPortRepository::new(pool.clone())),
            rule_configs: Arc::new(SqlxRuleConfigRepository::new(pool)),
        }
    }
}

/// Rule synthesized for a newly exposed component port.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DefaultRule {
    Http(HttpRule),
    Tcp(TcpRule),
}

/// A stored certificate after an update, with the per-region push results.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateUpdateResult {
    pub certificate: Certificate,
    pub fanout: FanoutReport,
}

/// Counts of local rules removed for a deleted port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemovedRules {
    pub http: u64,
    pub tcp: u64,
}

/// Binds, updates and unbinds gateway rules against a region and records
/// them locally.
#[derive(Clone)]
pub struct GatewayRuleSyncEngine {
    api: Arc<dyn GatewayApi>,
    regions: Arc<dyn RegionEndpointRegistry>,
    repos: GatewayRepositories,
}

impl GatewayRuleSyncEngine {
    pub fn new(
        api: Arc<dyn GatewayApi>,
        regions: Arc<dyn RegionEndpointRegistry>,
        repos: GatewayRepositories,
    ) -> Self {
        Self { api, regions, repos }
    }

    pub fn repositories(&self) -> &GatewayRepositories {
        &self.repos
    }

    /// Addresses the region's gateway listens on.
    pub async fn gateway_ips(&self, region_name: &str) -> Result<Value> {
        self.api.gateway_ips(region_name).await
    }

    /// Version body of the region controller.
    pub async fn probe(&self, region_name: &str) -> Result<Value> {
        self.api.probe(region_name).await
    }

    /// Drop the local rules of a component port that no longer exists.
    #[instrument(skip(self), fields(component_id = %component_id, port = container_port))]
    pub async fn remove_port_rules(
        &self,
        component_id: &ComponentId,
        container_port: u16,
    ) -> Result<RemovedRules> {
        let mut rule_ids: Vec<String> = self
            .repos
            .http_rules
            .list_by_component_port(component_id, container_port)
            .await?
            .into_iter()
            .map(|rule| rule.rule_id.into())
            .collect();
        rule_ids.extend(
            self.repos
                .tcp_rules
                .list_by_component_port(component_id, container_port)
                .await?
                .into_iter()
                .map(|rule| rule.tcp_rule_id.into()),
        );

        let http = self.repos.http_rules.delete_by_component_port(component_id, container_port).await?;
        let tcp = self.repos.tcp_rules.delete_by_component_port(component_id, container_port).await?;
        let configs = self.repos.rule_configs.delete_many(&rule_ids).await?;

        info!(http, tcp, configs, "Removed gateway rules of deleted port");
        Ok(RemovedRules { http, tcp })
    }

    /// Record a default rule for a port that was just exposed.
    ///
    /// HTTP ports get the platform hostname locally; the region creates the
    /// matching ingress itself when the port opens. Other protocols reserve a
    /// free gateway port first. A region that cannot hand out a port is logged
    /// and yields `None`.
    #[instrument(
        skip(self, scope, component),
        fields(region = %scope.region_name, component_id = %component.component_id, port = container_port)
    )]
    pub async fn provision_default_rule(
        &self,
        scope: &GatewayScope,
        component: &ComponentRef,
        container_port: u16,
        port_protocol: &str,
    ) -> Result<Option<DefaultRule>> {
        let result = if port_protocol.eq_ignore_ascii_case(HttpProtocol::Http.as_str()) {
            self.provision_default_http(scope, component, container_port).await.map(Some)
        } else {
            self.provision_default_stream(scope, component, container_port, port_protocol).await
        };
        observe("provision_default", result)
    }

    async fn provision_default_http(
        &self,
        scope: &GatewayScope,
        component: &ComponentRef,
        container_port: u16,
    ) -> Result<DefaultRule> {
        let domain_name = self
            .default_hostname(scope, component, container_port)
            .await?
            .ok_or_else(|| {
                Error::config(format!("region {} has no http domain configured", scope.region_name))
            })?;

        let rule_id = HttpRuleId::derive(&domain_name, DEFAULT_RULE_PATH);
        if let Some(existing) = self.repos.http_rules.get(&rule_id).await? {
            debug!(rule_id = %rule_id, "Default http rule already recorded");
            return Ok(DefaultRule::Http(existing));
        }

        let now = Utc::now();
        let rule = HttpRule {
            rule_id,
            component_id: component.component_id.clone(),
            env_id: scope.env_id.clone(),
            region_name: scope.region_name.clone(),
            container_port,
            domain_name,
            protocol: HttpProtocol::Http,
            certificate_id: None,
            path: DEFAULT_RULE_PATH.to_string(),
            cookie_match: None,
            header_match: None,
            weight: DEFAULT_RULE_WEIGHT,
            path_rewrite: false,
            rewrites: Vec::new(),
            rule_extensions: Vec::new(),
            is_custom: false,
            is_senior: false,
            created_at: now,
            updated_at: now,
        };

        self.repos.http_rules.insert_all(std::slice::from_ref(&rule)).await?;
        info!(rule_id = %rule.rule_id, domain = %rule.domain_name, "Created default http rule");
        Ok(DefaultRule::Http(rule))
    }

    async fn provision_default_stream(
        &self,
        scope: &GatewayScope,
        component: &ComponentRef,
        container_port: u16,
        port_protocol: &str,
    ) -> Result<Option<DefaultRule>> {
        let port = match self.api.free_port(&scope.region_name, true).await {
            Ok(port) => port,
            Err(e) => {
                warn!(error = %e, "Region has no free stream port, skipping default rule");
                return Ok(None);
            }
        };

        let endpoint = format!("{}:{}", DEFAULT_STREAM_IP, port);
        let now = Utc::now();
        let rule = TcpRule {
            tcp_rule_id: TcpRuleId::derive(&endpoint),
            component_id: component.component_id.clone(),
            env_id: scope.env_id.clone(),
            region_name: scope.region_name.clone(),
            container_port,
            endpoint,
            protocol: StreamProtocol::from_declared(Some(port_protocol)),
            rule_extensions: Vec::new(),
            is_custom: false,
            created_at: now,
            updated_at: now,
        };

        self.repos.tcp_rules.insert(&rule).await?;
        info!(tcp_rule_id = %rule.tcp_rule_id, endpoint = %rule.endpoint, "Created default stream rule");
        Ok(Some(DefaultRule::Tcp(rule)))
    }

    /// Platform hostname of a component port, `None` when the region serves no
    /// http domain.
    async fn default_hostname(
        &self,
        scope: &GatewayScope,
        component: &ComponentRef,
        container_port: u16,
    ) -> Result<Option<String>> {
        let region = self.regions.resolve(&scope.region_name).await?;
        Ok(region.http_domain.filter(|d| !d.is_empty()).map(|http_domain| {
            format!("{}.{}.{}.{}", container_port, component.component_alias, scope.env_name, http_domain)
        }))
    }
}

/// Turn a region "not found" on delete into a successful, tagged outcome.
fn absorb_remote_not_found(result: Result<()>) -> Result<DeleteOutcome> {
    match result {
        Ok(()) => Ok(DeleteOutcome::Deleted),
        Err(e) if e.is_remote_not_found() => {
            debug!(error = %e, "Region no longer has the rule");
            Ok(DeleteOutcome::NotFoundTreatedAsOk)
        }
        Err(e) => Err(e),
    }
}

fn observe<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    let outcome = match &result {
        Ok(_) => "success",
        Err(e) if e.is_remote() => "remote_error",
        Err(_) => "rejected",
    };
    record_gateway_sync(operation, outcome);
    result
}
