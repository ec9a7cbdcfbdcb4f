//! HTTP domain bind, update and unbind.

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::{absorb_remote_not_found, observe, GatewayRuleSyncEngine};
use crate::domain::{
    BindHttpRule, Certificate, CertificateId, ComponentId, DeleteOutcome, GatewayScope, HttpProtocol,
    HttpRule, HttpRuleId, UpdateHttpRule, DEFAULT_RULE_PATH, DEFAULT_RULE_WEIGHT,
};
use crate::errors::{Error, Result, ValidationError};
use crate::region::{HttpRuleBody, HttpRuleDeleteBody};
use crate::utils::certificates;
use crate::validation::validate_domain_name;

const MAX_RULE_WEIGHT: u8 = 100;

fn normalize_path(path: Option<&str>) -> String {
    match path.map(str::trim) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => DEFAULT_RULE_PATH.to_string(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn check_weight(weight: u8) -> Result<()> {
    if weight == 0 || weight > MAX_RULE_WEIGHT {
        return Err(ValidationError::Field {
            field: "weight".into(),
            message: format!("must be between 1 and {}", MAX_RULE_WEIGHT),
        }
        .into());
    }
    Ok(())
}

impl GatewayRuleSyncEngine {
    /// Bind a domain to a component port.
    ///
    /// `httpandhttps` produces two rules: an https rule carrying the
    /// certificate and a plain http twin. Both are bound remotely before
    /// either is recorded; if the second bind fails the first is removed
    /// from the region again.
    #[instrument(
        skip(self, scope, request),
        fields(region = %scope.region_name, domain = %request.domain_name, port = request.container_port),
        name = "gateway_bind_http"
    )]
    pub async fn bind_http_rule(&self, scope: &GatewayScope, request: BindHttpRule) -> Result<Vec<HttpRule>> {
        observe("bind_http", self.bind_http(scope, request).await)
    }

    async fn bind_http(&self, scope: &GatewayScope, request: BindHttpRule) -> Result<Vec<HttpRule>> {
        validate_domain_name(&request.domain_name)?;
        let weight = request.weight.unwrap_or(DEFAULT_RULE_WEIGHT);
        check_weight(weight)?;

        let certificate = match &request.certificate_id {
            Some(id) => Some(self.covering_certificate(scope, id, &request.domain_name).await?),
            None => None,
        };
        if request.protocol == HttpProtocol::HttpAndHttps && certificate.is_none() {
            return Err(ValidationError::MissingCertificate.into());
        }

        let path = normalize_path(request.path.as_deref());
        let cookie_match = non_empty(request.cookie_match);
        let header_match = non_empty(request.header_match);
        let default_host =
            self.default_hostname(scope, &request.component, request.container_port).await?;
        let now = Utc::now();

        let rule = HttpRule {
            rule_id: HttpRuleId::derive(&request.domain_name, &path),
            component_id: request.component.component_id.clone(),
            env_id: scope.env_id.clone(),
            region_name: scope.region_name.clone(),
            container_port: request.container_port,
            is_custom: default_host.as_deref() != Some(request.domain_name.as_str()),
            is_senior: HttpRule::compute_is_senior(&path, cookie_match.as_deref(), header_match.as_deref()),
            domain_name: request.domain_name,
            protocol: request.protocol,
            certificate_id: certificate.as_ref().map(|c| c.certificate_id.clone()),
            path,
            cookie_match,
            header_match,
            weight,
            path_rewrite: request.path_rewrite,
            rewrites: request.rewrites,
            rule_extensions: request.rule_extensions,
            created_at: now,
            updated_at: now,
        };

        let rules = if rule.protocol == HttpProtocol::HttpAndHttps {
            let twin = HttpRule {
                rule_id: HttpRuleId::derive_http_twin(&rule.domain_name, &rule.path),
                protocol: HttpProtocol::Http,
                certificate_id: None,
                ..rule.clone()
            };
            vec![HttpRule { protocol: HttpProtocol::Https, ..rule }, twin]
        } else {
            vec![rule]
        };

        for rule in &rules {
            self.ensure_http_unique(rule, None).await?;
        }

        for (bound, rule) in rules.iter().enumerate() {
            let material = rule.certificate_id.as_ref().and(certificate.as_ref());
            let body = HttpRuleBody::new(scope, rule, material);
            if let Err(e) = self.api.bind_http_rule(scope, &body).await {
                for done in &rules[..bound] {
                    self.compensate_http_bind(scope, done).await;
                }
                return Err(e);
            }
        }

        self.repos.http_rules.insert_all(&rules).await?;

        for rule in &rules {
            info!(rule_id = %rule.rule_id, protocol = %rule.protocol, path = %rule.path, "Bound http rule");
        }
        Ok(rules)
    }

    /// Change an existing HTTP rule. The rule keeps its id; the protocol
    /// follows whether a certificate is attached after the change.
    #[instrument(skip(self, scope, update), fields(region = %scope.region_name, rule_id = %rule_id), name = "gateway_update_http")]
    pub async fn update_http_rule(
        &self,
        scope: &GatewayScope,
        rule_id: &HttpRuleId,
        update: UpdateHttpRule,
    ) -> Result<HttpRule> {
        observe("update_http", self.update_http(scope, rule_id, update).await)
    }

    async fn update_http(
        &self,
        scope: &GatewayScope,
        rule_id: &HttpRuleId,
        update: UpdateHttpRule,
    ) -> Result<HttpRule> {
        let existing = self.require_http_rule(rule_id).await?;
        let mut rule = existing.clone();

        if let Some(domain_name) = update.domain_name {
            rule.domain_name = domain_name;
        }
        if let Some(certificate_id) = update.certificate_id {
            rule.certificate_id = certificate_id;
        }
        if let Some(path) = update.path {
            rule.path = normalize_path(Some(&path));
        }
        if let Some(cookie_match) = update.cookie_match {
            rule.cookie_match = non_empty(cookie_match);
        }
        if let Some(header_match) = update.header_match {
            rule.header_match = non_empty(header_match);
        }
        if let Some(weight) = update.weight {
            rule.weight = weight;
        }
        if let Some(path_rewrite) = update.path_rewrite {
            rule.path_rewrite = path_rewrite;
        }
        if let Some(rewrites) = update.rewrites {
            rule.rewrites = rewrites;
        }
        if let Some(rule_extensions) = update.rule_extensions {
            rule.rule_extensions = rule_extensions;
        }

        validate_domain_name(&rule.domain_name)?;
        check_weight(rule.weight)?;
        let certificate = match &rule.certificate_id {
            Some(id) => Some(self.covering_certificate(scope, id, &rule.domain_name).await?),
            None => None,
        };

        rule.protocol = if certificate.is_some() { HttpProtocol::Https } else { HttpProtocol::Http };
        rule.is_senior = HttpRule::compute_is_senior(
            &rule.path,
            rule.cookie_match.as_deref(),
            rule.header_match.as_deref(),
        );
        if rule.domain_name != existing.domain_name {
            rule.is_custom = true;
        }
        rule.updated_at = Utc::now();

        self.ensure_http_unique(&rule, Some(rule_id)).await?;

        let body = HttpRuleBody::new(scope, &rule, certificate.as_ref());
        self.api.update_http_rule(scope, &body).await?;
        self.repos.http_rules.update(&rule).await?;

        info!(domain = %rule.domain_name, protocol = %rule.protocol, "Updated http rule");
        Ok(rule)
    }

    /// Remove a rule from the region and then locally. A region that no
    /// longer has the rule counts as removed.
    #[instrument(skip(self, scope), fields(region = %scope.region_name, rule_id = %rule_id), name = "gateway_unbind_http")]
    pub async fn unbind_http_rule(&self, scope: &GatewayScope, rule_id: &HttpRuleId) -> Result<DeleteOutcome> {
        observe("unbind_http", self.unbind_http(scope, rule_id).await)
    }

    async fn unbind_http(&self, scope: &GatewayScope, rule_id: &HttpRuleId) -> Result<DeleteOutcome> {
        let rule = self.require_http_rule(rule_id).await?;

        let body = HttpRuleDeleteBody::from(&rule);
        let outcome = absorb_remote_not_found(self.api.delete_http_rule(scope, &body).await)?;
        self.repos.http_rules.delete(rule_id).await?;
        self.repos.rule_configs.delete_many(&[rule_id.to_string()]).await?;

        info!(domain = %rule.domain_name, outcome = ?outcome, "Unbound http rule");
        Ok(outcome)
    }

    pub async fn get_http_rule(&self, rule_id: &HttpRuleId) -> Result<Option<HttpRule>> {
        self.repos.http_rules.get(rule_id).await
    }

    pub async fn list_http_rules(
        &self,
        component_id: &ComponentId,
        container_port: u16,
    ) -> Result<Vec<HttpRule>> {
        self.repos.http_rules.list_by_component_port(component_id, container_port).await
    }

    pub(super) async fn require_http_rule(&self, rule_id: &HttpRuleId) -> Result<HttpRule> {
        self.repos
            .http_rules
            .get(rule_id)
            .await?
            .ok_or_else(|| Error::not_found("http rule", rule_id.as_str()))
    }

    /// Load a certificate of the scope's environment and check its SANs cover
    /// `domain`.
    async fn covering_certificate(
        &self,
        scope: &GatewayScope,
        certificate_id: &CertificateId,
        domain: &str,
    ) -> Result<Certificate> {
        let certificate = self
            .repos
            .certificates
            .get(certificate_id)
            .await?
            .filter(|c| c.env_id == scope.env_id)
            .ok_or_else(|| Error::not_found("certificate", certificate_id.as_str()))?;

        let sans = certificates::sans_of(&certificate.certificate)?;
        if !certificates::covers(&sans, domain) {
            return Err(ValidationError::DomainNotCovered {
                domain: domain.to_string(),
                certificate: certificate.alias.clone(),
            }
            .into());
        }
        Ok(certificate)
    }

    async fn ensure_http_unique(&self, rule: &HttpRule, exclude: Option<&HttpRuleId>) -> Result<()> {
        if exclude.is_none() && self.repos.http_rules.get(&rule.rule_id).await?.is_some() {
            return Err(ValidationError::DuplicateRule {
                detail: format!("{} {}{} already bound", rule.protocol, rule.domain_name, rule.path),
            }
            .into());
        }

        if let Some(existing) = self.repos.http_rules.find_conflict(rule, exclude).await? {
            return Err(ValidationError::DuplicateRule {
                detail: format!(
                    "{} {}{} on port {} (rule {})",
                    existing.protocol, existing.domain_name, existing.path, existing.container_port, existing.rule_id
                ),
            }
            .into());
        }
        Ok(())
    }

    async fn compensate_http_bind(&self, scope: &GatewayScope, rule: &HttpRule) {
        let body = HttpRuleDeleteBody::from(rule);
        match absorb_remote_not_found(self.api.delete_http_rule(scope, &body).await) {
            Ok(_) => info!(rule_id = %rule.rule_id, "Rolled back partial http bind"),
            Err(e) => warn!(rule_id = %rule.rule_id, error = %e, "Failed to roll back partial http bind"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{harness, scope, self_signed};
    use crate::domain::{
        BindHttpRule, CertificateId, ComponentRef, DeleteOutcome, HttpProtocol, HttpRuleId,
        NewCertificate, UpdateHttpRule,
    };
    use crate::errors::{Error, ValidationError};

    fn component() -> ComponentRef {
        ComponentRef::new("svc-1", "gr1a2b")
    }

    fn new_certificate(alias: &str, names: &[&str]) -> NewCertificate {
        let (certificate, private_key) = self_signed(names);
        NewCertificate {
            alias: alias.into(),
            certificate_id: None,
            certificate,
            private_key,
            certificate_type: "server".into(),
        }
    }

    #[tokio::test]
    async fn test_bind_records_rule_with_defaults() {
        let h = harness().await;

        let rules = h
            .engine
            .bind_http_rule(&scope(), BindHttpRule::new(component(), 8080, "api.example.com"))
            .await
            .unwrap();

        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.rule_id, HttpRuleId::derive("api.example.com", "/"));
        assert_eq!(rule.path, "/");
        assert_eq!(rule.weight, 100);
        assert!(rule.is_custom);
        assert!(!rule.is_senior);
        assert_eq!(h.gateway.calls(), vec!["bind_http@region-a"]);

        let body = &h.gateway.bodies()[0];
        assert_eq!(body["tenant_env_id"], "r-env-1");
        assert_eq!(body["http_rule_id"], rule.rule_id.as_str());

        let stored = h.engine.get_http_rule(&rule.rule_id).await.unwrap().unwrap();
        assert_eq!(stored.domain_name, "api.example.com");
    }

    #[tokio::test]
    async fn test_default_hostname_is_not_custom() {
        let h = harness().await;
        let rules = h
            .engine
            .bind_http_rule(&scope(), BindHttpRule::new(component(), 8080, "8080.gr1a2b.prod.apps.region-a.local"))
            .await
            .unwrap();
        assert!(!rules[0].is_custom);
    }

    #[tokio::test]
    async fn test_invalid_domain_is_rejected_locally() {
        let h = harness().await;
        let err = h
            .engine
            .bind_http_rule(&scope(), BindHttpRule::new(component(), 8080, "Bad_Domain"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LocalValidation(ValidationError::InvalidDomain { .. })));
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_uncovered_domain_makes_no_remote_call() {
        let h = harness().await;
        let certificate = h
            .engine
            .add_certificate(&scope().env_id, new_certificate("wild", &["*.example.com"]))
            .await
            .unwrap();

        let request = BindHttpRule::new(component(), 8080, "api.other.org")
            .with_certificate(HttpProtocol::Https, certificate.certificate_id.clone());
        let err = h.engine.bind_http_rule(&scope(), request).await.unwrap_err();

        assert!(matches!(err, Error::LocalValidation(ValidationError::DomainNotCovered { .. })));
        assert_eq!(h.gateway.count("bind_http"), 0);
        assert!(h.engine.list_http_rules(&component().component_id, 8080).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_bind_is_rejected_before_remote_call() {
        let h = harness().await;
        let request = BindHttpRule::new(component(), 80, "foo.example.com");

        h.engine.bind_http_rule(&scope(), request.clone()).await.unwrap();
        let err = h.engine.bind_http_rule(&scope(), request).await.unwrap_err();

        assert!(matches!(err, Error::LocalValidation(ValidationError::DuplicateRule { .. })));
        assert_eq!(h.gateway.count("bind_http"), 1);
    }

    #[tokio::test]
    async fn test_http_and_https_creates_two_rules() {
        let h = harness().await;
        let certificate = h
            .engine
            .add_certificate(&scope().env_id, new_certificate("api", &["api.example.com"]))
            .await
            .unwrap();

        let request = BindHttpRule::new(component(), 8080, "api.example.com")
            .with_certificate(HttpProtocol::HttpAndHttps, certificate.certificate_id.clone());
        h.engine.bind_http_rule(&scope(), request).await.unwrap();

        let rules = h.engine.list_http_rules(&component().component_id, 8080).await.unwrap();
        assert_eq!(rules.len(), 2);
        let https = rules.iter().find(|r| r.protocol == HttpProtocol::Https).unwrap();
        let http = rules.iter().find(|r| r.protocol == HttpProtocol::Http).unwrap();
        assert_eq!(https.certificate_id.as_ref(), Some(&certificate.certificate_id));
        assert_eq!(http.certificate_id, None);
        assert_eq!(https.domain_name, http.domain_name);
        assert_ne!(https.rule_id, http.rule_id);

        let bodies = h.gateway.bodies();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["certificate_name"], "api");
        assert_eq!(bodies[1]["certificate"], "");
    }

    #[tokio::test]
    async fn test_http_and_https_requires_certificate() {
        let h = harness().await;
        let mut request = BindHttpRule::new(component(), 8080, "api.example.com");
        request.protocol = HttpProtocol::HttpAndHttps;

        let err = h.engine.bind_http_rule(&scope(), request).await.unwrap_err();
        assert!(matches!(err, Error::LocalValidation(ValidationError::MissingCertificate)));
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_second_bind_failure_rolls_back_first() {
        let h = harness().await;
        let certificate = h
            .engine
            .add_certificate(&scope().env_id, new_certificate("api", &["api.example.com"]))
            .await
            .unwrap();
        h.gateway.fail("bind_http#2", 500);

        let request = BindHttpRule::new(component(), 8080, "api.example.com")
            .with_certificate(HttpProtocol::HttpAndHttps, certificate.certificate_id.clone());
        assert!(h.engine.bind_http_rule(&scope(), request).await.is_err());

        assert_eq!(h.gateway.count("bind_http"), 2);
        assert_eq!(h.gateway.count("delete_http"), 1);
        assert_eq!(h.gateway.bodies()[2]["http_rule_id"], h.gateway.bodies()[0]["http_rule_id"]);
        assert!(h.engine.list_http_rules(&component().component_id, 8080).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_leaves_no_local_rule() {
        let h = harness().await;
        h.gateway.fail("bind_http", 409);

        let err = h
            .engine
            .bind_http_rule(&scope(), BindHttpRule::new(component(), 8080, "api.example.com"))
            .await
            .unwrap_err();
        assert!(err.is_remote());
        assert!(h.engine.list_http_rules(&component().component_id, 8080).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_and_recomputes_protocol() {
        let h = harness().await;
        let certificate = h
            .engine
            .add_certificate(&scope().env_id, new_certificate("wild", &["*.example.com"]))
            .await
            .unwrap();
        let rules = h
            .engine
            .bind_http_rule(&scope(), BindHttpRule::new(component(), 8080, "api.example.com"))
            .await
            .unwrap();
        let rule_id = rules[0].rule_id.clone();

        let update = UpdateHttpRule {
            certificate_id: Some(Some(certificate.certificate_id.clone())),
            path: Some("/v1".into()),
            weight: Some(40),
            ..Default::default()
        };
        let updated = h.engine.update_http_rule(&scope(), &rule_id, update).await.unwrap();

        assert_eq!(updated.rule_id, rule_id);
        assert_eq!(updated.protocol, HttpProtocol::Https);
        assert_eq!(updated.path, "/v1");
        assert_eq!(updated.weight, 40);
        assert!(updated.is_senior);
        assert_eq!(h.gateway.count("update_http"), 1);

        let stored = h.engine.get_http_rule(&rule_id).await.unwrap().unwrap();
        assert_eq!(stored, updated);

        let cleared = UpdateHttpRule { certificate_id: Some(None), ..Default::default() };
        let updated = h.engine.update_http_rule(&scope(), &rule_id, cleared).await.unwrap();
        assert_eq!(updated.protocol, HttpProtocol::Http);
    }

    #[tokio::test]
    async fn test_update_unknown_rule() {
        let h = harness().await;
        let err = h
            .engine
            .update_http_rule(&scope(), &HttpRuleId::from("missing"), UpdateHttpRule::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_with_unknown_certificate() {
        let h = harness().await;
        let rules = h
            .engine
            .bind_http_rule(&scope(), BindHttpRule::new(component(), 8080, "api.example.com"))
            .await
            .unwrap();

        let update = UpdateHttpRule {
            certificate_id: Some(Some(CertificateId::from("nope"))),
            ..Default::default()
        };
        let err = h.engine.update_http_rule(&scope(), &rules[0].rule_id, update).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(h.gateway.count("update_http"), 0);
    }

    #[tokio::test]
    async fn test_unbind_treats_remote_404_as_deleted() {
        let h = harness().await;
        let rules = h
            .engine
            .bind_http_rule(&scope(), BindHttpRule::new(component(), 8080, "api.example.com"))
            .await
            .unwrap();
        h.gateway.fail("delete_http", 404);

        let outcome = h.engine.unbind_http_rule(&scope(), &rules[0].rule_id).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::NotFoundTreatedAsOk);
        assert!(h.engine.get_http_rule(&rules[0].rule_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unbind_keeps_rule_on_remote_failure() {
        let h = harness().await;
        let rules = h
            .engine
            .bind_http_rule(&scope(), BindHttpRule::new(component(), 8080, "api.example.com"))
            .await
            .unwrap();
        h.gateway.fail("delete_http", 500);

        assert!(h.engine.unbind_http_rule(&scope(), &rules[0].rule_id).await.is_err());
        assert!(h.engine.get_http_rule(&rules[0].rule_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unbind_unknown_rule() {
        let h = harness().await;
        let err = h.engine.unbind_http_rule(&scope(), &HttpRuleId::from("missing")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(h.gateway.calls().is_empty());
    }
}
