//! Certificates of an environment and their propagation to regions.

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, instrument, warn};

use super::{observe, CertificateUpdateResult, GatewayRuleSyncEngine};
use crate::domain::{
    Certificate, CertificateId, CertificateUpdate, EnvId, FanoutFailure, FanoutReport, GatewayScope,
    NewCertificate,
};
use crate::errors::{Error, Result, ValidationError};
use crate::region::CertificateBody;
use crate::utils::certificates;

fn require_alias(alias: &str) -> Result<String> {
    let alias = alias.trim();
    if alias.is_empty() {
        return Err(ValidationError::Field { field: "alias".into(), message: "must not be empty".into() }.into());
    }
    Ok(alias.to_string())
}

impl GatewayRuleSyncEngine {
    /// Register a certificate for an environment after validating the pair.
    #[instrument(skip(self, request), fields(env_id = %env_id, alias = %request.alias), name = "gateway_add_certificate")]
    pub async fn add_certificate(&self, env_id: &EnvId, request: NewCertificate) -> Result<Certificate> {
        observe("add_certificate", self.add(env_id, request).await)
    }

    async fn add(&self, env_id: &EnvId, request: NewCertificate) -> Result<Certificate> {
        let alias = require_alias(&request.alias)?;
        self.ensure_alias_free(env_id, &alias).await?;
        let info = certificates::validate(&request.certificate, &request.private_key)?;

        let now = Utc::now();
        let certificate = Certificate {
            certificate_id: request.certificate_id.unwrap_or_else(CertificateId::generate),
            env_id: env_id.clone(),
            alias,
            certificate: request.certificate,
            private_key: request.private_key,
            certificate_type: request.certificate_type,
            created_at: now,
            updated_at: now,
        };
        self.repos.certificates.insert(&certificate).await?;

        info!(
            certificate_id = %certificate.certificate_id,
            not_after = %info.not_after,
            sans = ?info.sans,
            "Added certificate"
        );
        Ok(certificate)
    }

    /// Change a certificate and push the new material to every open region of
    /// its environment.
    ///
    /// The stored record is updated first. Region pushes run concurrently and
    /// a failing region is reported in the result rather than failing the call.
    #[instrument(
        skip(self, scope, update),
        fields(env_id = %scope.env_id, certificate_id = %certificate_id),
        name = "gateway_update_certificate"
    )]
    pub async fn update_certificate(
        &self,
        scope: &GatewayScope,
        certificate_id: &CertificateId,
        update: CertificateUpdate,
    ) -> Result<CertificateUpdateResult> {
        observe("update_certificate", self.update(scope, certificate_id, update).await)
    }

    async fn update(
        &self,
        scope: &GatewayScope,
        certificate_id: &CertificateId,
        update: CertificateUpdate,
    ) -> Result<CertificateUpdateResult> {
        let mut certificate = self.get_certificate(&scope.env_id, certificate_id).await?;

        let pem = update.certificate.filter(|c| !c.trim().is_empty()).unwrap_or_else(|| certificate.certificate.clone());
        let key = update.private_key.filter(|k| !k.trim().is_empty()).unwrap_or_else(|| certificate.private_key.clone());
        certificates::validate(&pem, &key)?;

        let alias = require_alias(&update.alias)?;
        if alias != certificate.alias {
            self.ensure_alias_free(&scope.env_id, &alias).await?;
            certificate.alias = alias;
        }
        if let Some(certificate_type) = update.certificate_type.filter(|t| !t.is_empty()) {
            certificate.certificate_type = certificate_type;
        }
        certificate.certificate = pem;
        certificate.private_key = key;
        certificate.updated_at = Utc::now();

        self.repos.certificates.update(&certificate).await?;
        let fanout = self.push_certificate(scope, &certificate).await?;

        info!(
            alias = %certificate.alias,
            pushed = fanout.pushed.len(),
            failed = fanout.failed.len(),
            "Updated certificate"
        );
        Ok(CertificateUpdateResult { certificate, fanout })
    }

    async fn push_certificate(&self, scope: &GatewayScope, certificate: &Certificate) -> Result<FanoutReport> {
        let regions = self.repos.env_regions.list_open_regions(&scope.env_id).await?;
        let body = CertificateBody::from(certificate);
        let body = &body;

        let pushes = regions.into_iter().map(|region_name| {
            let target = scope.in_region(region_name);
            async move {
                let result = self.api.update_certificate(&target, body).await;
                (target.region_name, result)
            }
        });

        let mut report = FanoutReport::default();
        for (region_name, result) in join_all(pushes).await {
            match result {
                Ok(()) => report.pushed.push(region_name),
                Err(e) => {
                    warn!(region = %region_name, error = %e, "Failed to push certificate to region");
                    report.failed.push(FanoutFailure { region_name, error: e.to_string() });
                }
            }
        }
        Ok(report)
    }

    /// Delete a certificate no HTTP rule references.
    #[instrument(skip(self), fields(env_id = %env_id, certificate_id = %certificate_id), name = "gateway_delete_certificate")]
    pub async fn delete_certificate(&self, env_id: &EnvId, certificate_id: &CertificateId) -> Result<()> {
        observe("delete_certificate", self.delete(env_id, certificate_id).await)
    }

    async fn delete(&self, env_id: &EnvId, certificate_id: &CertificateId) -> Result<()> {
        self.get_certificate(env_id, certificate_id).await?;

        if !self.repos.http_rules.list_by_certificate(certificate_id).await?.is_empty() {
            return Err(ValidationError::CertificateInUse { certificate_id: certificate_id.to_string() }.into());
        }

        self.repos.certificates.delete(certificate_id).await?;
        info!("Deleted certificate");
        Ok(())
    }

    pub async fn get_certificate(&self, env_id: &EnvId, certificate_id: &CertificateId) -> Result<Certificate> {
        self.repos
            .certificates
            .get(certificate_id)
            .await?
            .filter(|c| &c.env_id == env_id)
            .ok_or_else(|| Error::not_found("certificate", certificate_id.as_str()))
    }

    pub async fn list_certificates(&self, env_id: &EnvId) -> Result<Vec<Certificate>> {
        self.repos.certificates.list_by_env(env_id).await
    }

    async fn ensure_alias_free(&self, env_id: &EnvId, alias: &str) -> Result<()> {
        if self.repos.certificates.get_by_alias(env_id, alias).await?.is_some() {
            return Err(ValidationError::CertificateAliasExists { alias: alias.to_string() }.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{harness, scope, self_signed};
    use crate::domain::{
        BindHttpRule, CertificateId, CertificateUpdate, ComponentRef, EnvId, HttpProtocol, NewCertificate,
    };
    use crate::errors::{CertificateError, Error, ValidationError};
    use crate::storage::SqlxEnvRegionRepository;

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
    async fn test_add_and_get() {
        let h = harness().await;
        let env_id = scope().env_id;

        let added = h.engine.add_certificate(&env_id, new_certificate("api", &["api.example.com"])).await.unwrap();
        let fetched = h.engine.get_certificate(&env_id, &added.certificate_id).await.unwrap();
        assert_eq!(fetched, added);

        // Other environments cannot see it.
        let err = h.engine.get_certificate(&EnvId::from("env-2"), &added.certificate_id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_alias_and_bad_pairs() {
        let h = harness().await;
        let env_id = scope().env_id;
        h.engine.add_certificate(&env_id, new_certificate("api", &["api.example.com"])).await.unwrap();

        let err = h.engine.add_certificate(&env_id, new_certificate("api", &["api.example.com"])).await.unwrap_err();
        assert!(matches!(err, Error::LocalValidation(ValidationError::CertificateAliasExists { .. })));

        let (certificate, _) = self_signed(&["api.example.com"]);
        let (_, private_key) = self_signed(&["api.example.com"]);
        let mismatched = NewCertificate {
            alias: "other".into(),
            certificate_id: Some(CertificateId::from("fixed-id")),
            certificate,
            private_key,
            certificate_type: "server".into(),
        };
        let err = h.engine.add_certificate(&env_id, mismatched).await.unwrap_err();
        assert!(matches!(
            err,
            Error::LocalValidation(ValidationError::Certificate(CertificateError::CertKeyMismatch))
        ));
    }

    #[tokio::test]
    async fn test_update_fans_out_to_open_regions() {
        let h = harness().await;
        let env_regions = SqlxEnvRegionRepository::new(h.pool.clone());
        env_regions.attach(&scope().env_id, "region-a", "r-env-1").await.unwrap();
        env_regions.attach(&scope().env_id, "region-b", "r-env-1").await.unwrap();
        env_regions.attach(&scope().env_id, "region-c", "r-env-1").await.unwrap();
        env_regions.close(&scope().env_id, "region-c").await.unwrap();
        h.gateway.fail("update_certificate@region-b", 500);

        let added = h.engine.add_certificate(&scope().env_id, new_certificate("api", &["api.example.com"])).await.unwrap();
        let (certificate, private_key) = self_signed(&["api.example.com", "www.example.com"]);
        let update = CertificateUpdate {
            alias: "api-renewed".into(),
            certificate: Some(certificate.clone()),
            private_key: Some(private_key),
            certificate_type: None,
        };

        let result = h.engine.update_certificate(&scope(), &added.certificate_id, update).await.unwrap();

        assert_eq!(result.fanout.pushed, vec!["region-a".to_string()]);
        assert_eq!(result.fanout.failed.len(), 1);
        assert_eq!(result.fanout.failed[0].region_name, "region-b");
        assert!(!result.fanout.is_complete());

        // The stored record changed even though one region refused the push.
        let stored = h.engine.get_certificate(&scope().env_id, &added.certificate_id).await.unwrap();
        assert_eq!(stored.alias, "api-renewed");
        assert_eq!(stored.certificate, certificate);
        assert_eq!(stored.certificate_type, "server");

        let mut calls = h.gateway.calls();
        calls.sort();
        assert_eq!(calls, vec!["update_certificate@region-a", "update_certificate@region-b"]);
    }

    #[tokio::test]
    async fn test_update_keeps_material_when_absent() {
        let h = harness().await;
        let added = h.engine.add_certificate(&scope().env_id, new_certificate("api", &["api.example.com"])).await.unwrap();

        let update = CertificateUpdate { alias: "api".into(), ..Default::default() };
        let result = h.engine.update_certificate(&scope(), &added.certificate_id, update).await.unwrap();
        assert_eq!(result.certificate.certificate, added.certificate);
        assert!(result.fanout.pushed.is_empty());
        assert!(result.fanout.is_complete());
    }

    #[tokio::test]
    async fn test_update_rejects_taken_alias() {
        let h = harness().await;
        let env_id = scope().env_id;
        h.engine.add_certificate(&env_id, new_certificate("first", &["a.example.com"])).await.unwrap();
        let second = h.engine.add_certificate(&env_id, new_certificate("second", &["b.example.com"])).await.unwrap();

        let update = CertificateUpdate { alias: "first".into(), ..Default::default() };
        let err = h.engine.update_certificate(&scope(), &second.certificate_id, update).await.unwrap_err();
        assert!(matches!(err, Error::LocalValidation(ValidationError::CertificateAliasExists { .. })));
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_refused_while_in_use() {
        let h = harness().await;
        let added = h.engine.add_certificate(&scope().env_id, new_certificate("api", &["api.example.com"])).await.unwrap();

        let request = BindHttpRule::new(ComponentRef::new("svc-1", "gr1a2b"), 8080, "api.example.com")
            .with_certificate(HttpProtocol::Https, added.certificate_id.clone());
        let rules = h.engine.bind_http_rule(&scope(), request).await.unwrap();

        let err = h.engine.delete_certificate(&scope().env_id, &added.certificate_id).await.unwrap_err();
        assert!(matches!(err, Error::LocalValidation(ValidationError::CertificateInUse { .. })));

        h.engine.unbind_http_rule(&scope(), &rules[0].rule_id).await.unwrap();
        h.engine.delete_certificate(&scope().env_id, &added.certificate_id).await.unwrap();
        assert!(h.engine.list_certificates(&scope().env_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_certificate() {
        let h = harness().await;
        let err = h.engine.delete_certificate(&scope().env_id, &CertificateId::from("nope")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
