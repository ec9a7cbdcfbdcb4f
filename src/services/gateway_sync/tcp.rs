//! TCP/UDP endpoint bind, update and unbind.

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::{absorb_remote_not_found, observe, GatewayRuleSyncEngine};
use crate::domain::{
    BindTcpRule, ComponentId, DeleteOutcome, Endpoint, GatewayScope, StreamProtocol, TcpRule,
    TcpRuleId, UpdateOutcome, UpdateTcpRule,
};
use crate::errors::{Error, Result, ValidationError};
use crate::region::{TcpRuleBody, TcpRuleDeleteBody};

impl GatewayRuleSyncEngine {
    /// Bind an `ip:port` endpoint to a component port. The rule's protocol
    /// comes from the component's declared port.
    #[instrument(
        skip(self, scope, request),
        fields(region = %scope.region_name, endpoint = %request.endpoint, port = request.container_port),
        name = "gateway_bind_tcp"
    )]
    pub async fn bind_tcp_rule(&self, scope: &GatewayScope, request: BindTcpRule) -> Result<TcpRule> {
        observe("bind_tcp", self.bind_tcp(scope, request).await)
    }

    async fn bind_tcp(&self, scope: &GatewayScope, request: BindTcpRule) -> Result<TcpRule> {
        let endpoint: Endpoint = request.endpoint.parse()?;
        let endpoint_text = endpoint.to_string();
        let tcp_rule_id = TcpRuleId::derive(&endpoint_text);

        let taken = self.repos.tcp_rules.get(&tcp_rule_id).await?.is_some()
            || self.repos.tcp_rules.get_by_endpoint(&scope.region_name, &endpoint_text).await?.is_some();
        if taken {
            return Err(ValidationError::DuplicateRule { detail: format!("endpoint {} already bound", endpoint_text) }
                .into());
        }

        let declared = self
            .repos
            .component_ports
            .port_protocol(&request.component.component_id, request.container_port)
            .await?;

        let now = Utc::now();
        let rule = TcpRule {
            tcp_rule_id,
            component_id: request.component.component_id,
            env_id: scope.env_id.clone(),
            region_name: scope.region_name.clone(),
            container_port: request.container_port,
            endpoint: endpoint_text,
            protocol: StreamProtocol::from_declared(declared.as_deref()),
            rule_extensions: request.rule_extensions,
            is_custom: endpoint.port != request.default_port,
            created_at: now,
            updated_at: now,
        };

        let body = TcpRuleBody::new(scope, &rule, &endpoint.ip, endpoint.port);
        self.api.bind_tcp_rule(scope, &body).await?;
        self.repos.tcp_rules.insert(&rule).await?;

        info!(tcp_rule_id = %rule.tcp_rule_id, protocol = %rule.protocol, is_custom = rule.is_custom, "Bound tcp rule");
        Ok(rule)
    }

    /// Move an existing rule to a new endpoint.
    ///
    /// A region that does not know the rule does not stop the update: the
    /// local row is replaced all the same and the outcome says so.
    #[instrument(skip(self, scope, update), fields(region = %scope.region_name, tcp_rule_id = %tcp_rule_id), name = "gateway_update_tcp")]
    pub async fn update_tcp_rule(
        &self,
        scope: &GatewayScope,
        tcp_rule_id: &TcpRuleId,
        update: UpdateTcpRule,
    ) -> Result<UpdateOutcome> {
        observe("update_tcp", self.update_tcp(scope, tcp_rule_id, update).await)
    }

    async fn update_tcp(
        &self,
        scope: &GatewayScope,
        tcp_rule_id: &TcpRuleId,
        update: UpdateTcpRule,
    ) -> Result<UpdateOutcome> {
        let existing = self.require_tcp_rule(tcp_rule_id).await?;
        let endpoint: Endpoint = update.endpoint.parse()?;
        let endpoint_text = endpoint.to_string();

        if let Some(other) = self.repos.tcp_rules.get_by_endpoint(&scope.region_name, &endpoint_text).await? {
            if other.tcp_rule_id != existing.tcp_rule_id {
                return Err(ValidationError::DuplicateRule {
                    detail: format!("endpoint {} already bound by {}", endpoint_text, other.tcp_rule_id),
                }
                .into());
            }
        }

        let replacement = TcpRule {
            region_name: scope.region_name.clone(),
            container_port: update.container_port.unwrap_or(existing.container_port),
            endpoint: endpoint_text,
            rule_extensions: update.rule_extensions.unwrap_or_else(|| existing.rule_extensions.clone()),
            is_custom: endpoint.port != update.default_port,
            updated_at: Utc::now(),
            ..existing.clone()
        };

        let body = TcpRuleBody::new(scope, &replacement, &endpoint.ip, endpoint.port);
        let outcome = match self.api.update_tcp_rule(scope, &body).await {
            Ok(()) => UpdateOutcome::Updated,
            Err(e) if e.is_remote_not_found() => {
                warn!(error = %e, "Region does not know the tcp rule, replacing local record");
                UpdateOutcome::RemoteMissingReplaced
            }
            Err(e) => return Err(e),
        };

        self.repos.tcp_rules.replace(&existing.tcp_rule_id, &replacement).await?;

        info!(endpoint = %replacement.endpoint, outcome = ?outcome, "Updated tcp rule");
        Ok(outcome)
    }

    /// Remove a rule from the region and then locally.
    #[instrument(skip(self, scope), fields(region = %scope.region_name, tcp_rule_id = %tcp_rule_id), name = "gateway_unbind_tcp")]
    pub async fn unbind_tcp_rule(&self, scope: &GatewayScope, tcp_rule_id: &TcpRuleId) -> Result<DeleteOutcome> {
        observe("unbind_tcp", self.unbind_tcp(scope, tcp_rule_id).await)
    }

    async fn unbind_tcp(&self, scope: &GatewayScope, tcp_rule_id: &TcpRuleId) -> Result<DeleteOutcome> {
        let rule = self.require_tcp_rule(tcp_rule_id).await?;

        let body = TcpRuleDeleteBody { tcp_rule_id: rule.tcp_rule_id.to_string() };
        let outcome = absorb_remote_not_found(self.api.delete_tcp_rule(scope, &body).await)?;
        self.repos.tcp_rules.delete(tcp_rule_id).await?;
        self.repos.rule_configs.delete_many(&[tcp_rule_id.to_string()]).await?;

        info!(endpoint = %rule.endpoint, outcome = ?outcome, "Unbound tcp rule");
        Ok(outcome)
    }

    pub async fn get_tcp_rule(&self, tcp_rule_id: &TcpRuleId) -> Result<Option<TcpRule>> {
        self.repos.tcp_rules.get(tcp_rule_id).await
    }

    pub async fn list_tcp_rules(
        &self,
        component_id: &ComponentId,
        container_port: u16,
    ) -> Result<Vec<TcpRule>> {
        self.repos.tcp_rules.list_by_component_port(component_id, container_port).await
    }

    pub(super) async fn require_tcp_rule(&self, tcp_rule_id: &TcpRuleId) -> Result<TcpRule> {
        self.repos
            .tcp_rules
            .get(tcp_rule_id)
            .await?
            .ok_or_else(|| Error::not_found("tcp rule", tcp_rule_id.as_str()))
    }
}
