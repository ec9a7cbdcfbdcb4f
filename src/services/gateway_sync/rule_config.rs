//! Proxy parameters (headers, timeouts, buffering) of HTTP and TCP rules.

use tracing::{info, instrument};

use super::{observe, GatewayRuleSyncEngine};
use crate::domain::{GatewayScope, RuleConfig, RuleTarget};
use crate::errors::Result;
use crate::region::RuleConfigBody;
use crate::validation::validate_set_headers;

impl GatewayRuleSyncEngine {
    /// Set the proxy parameters of a rule on the region, then record them.
    ///
    /// Header keys are checked before the region is contacted, and the local
    /// record only changes once the region accepted the configuration.
    #[instrument(
        skip(self, scope, target, config),
        fields(region = %scope.region_name, rule_id = %target.rule_id(), kind = target.kind()),
        name = "gateway_update_rule_config"
    )]
    pub async fn update_rule_config(
        &self,
        scope: &GatewayScope,
        target: &RuleTarget,
        config: RuleConfig,
    ) -> Result<()> {
        observe("update_rule_config", self.update_config(scope, target, config).await)
    }

    async fn update_config(&self, scope: &GatewayScope, target: &RuleTarget, config: RuleConfig) -> Result<()> {
        validate_set_headers(&config.set_headers)?;

        let component_id = match target {
            RuleTarget::Http(rule_id) => self.require_http_rule(rule_id).await?.component_id,
            RuleTarget::Tcp(tcp_rule_id) => self.require_tcp_rule(tcp_rule_id).await?.component_id,
        };

        let body = RuleConfigBody {
            rule_id: target.rule_id().to_string(),
            service_id: component_id.to_string(),
            tenant_env_id: scope.region_tenant_env_id.clone(),
            body: config,
        };
        self.api.update_rule_config(scope, target, &body).await?;
        self.repos.rule_configs.upsert(target, &body.body).await?;

        info!(headers = body.body.set_headers.len(), "Updated rule config");
        Ok(())
    }

    pub async fn get_rule_config(&self, target: &RuleTarget) -> Result<Option<RuleConfig>> {
        self.repos.rule_configs.get(target.rule_id()).await
    }
}
