use regionctl::domain::{
    BindHttpRule, BindTcpRule, CertificateId, CertificateUpdate, ComponentRef, DeleteOutcome, EnvId, HeaderSetting,
    HttpProtocol, HttpRuleId, NewCertificate, RuleConfig, RuleTarget, StreamProtocol, TcpRuleId, UpdateOutcome,
    UpdateTcpRule,
};
use regionctl::errors::{Error, ValidationError};
use regionctl::region::GatewayApi;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{scope, self_signed, Stack, ENV_ID};

const HTTP_RULE_PATH: &str = "/v2/tenants/acme/envs/prod/http-rule";
const TCP_RULE_PATH: &str = "/v2/tenants/acme/envs/prod/tcp-rule";
const CERTIFICATE_PATH: &str = "/v2/tenants/acme/envs/prod/gateway/certificate";
const RULE_CONFIG_PATH: &str = "/v2/tenants/acme/envs/prod/rule-config";

fn ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"msg": "success", "bean": {}}))
}

#[tokio::test]
async fn test_bind_and_unbind_http_rule_round_trip() {
    let server = MockServer::start().await;
    let stack = Stack::new().await;
    stack.add_region("region-a", &server.uri()).await;

    let expected_id = HttpRuleId::derive("api.example.com", "/");
    Mock::given(method("POST"))
        .and(path(HTTP_RULE_PATH))
        .and(header("authorization", "test-token"))
        .and(body_partial_json(json!({
            "http_rule_id": expected_id.as_str(),
            "service_id": "svc-1",
            "tenant_env_id": "region-a-env-1",
            "domain": "api.example.com",
            "container_port": 8080,
            "protocol": "http",
            "path": "/",
            "weight": 100,
        })))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    let request = BindHttpRule::new(ComponentRef::new("svc-1", "web"), 8080, "api.example.com");
    let rules = stack.engine.bind_http_rule(&scope("region-a"), request).await.unwrap();

    assert_eq!(rules.len(), 1);
    let rule = &rules[0];
    assert_eq!(rule.rule_id, expected_id);
    assert_eq!(rule.path, "/");
    assert_eq!(rule.weight, 100);
    assert!(rule.is_custom);
    assert!(!rule.is_senior);
    assert_eq!(stack.engine.get_http_rule(&expected_id).await.unwrap().as_ref(), Some(rule));

    // The region already forgot the rule; the local row still goes.
    Mock::given(method("DELETE"))
        .and(path(HTTP_RULE_PATH))
        .and(body_partial_json(json!({"http_rule_id": expected_id.as_str()})))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"code": 404, "msg": "not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = stack.engine.unbind_http_rule(&scope("region-a"), &expected_id).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::NotFoundTreatedAsOk);
    assert!(stack.engine.get_http_rule(&expected_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_region_rejection_leaves_store_untouched() {
    let server = MockServer::start().await;
    let stack = Stack::new().await;
    stack.add_region("region-a", &server.uri()).await;

    Mock::given(method("POST"))
        .and(path(HTTP_RULE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"code": 10500, "msg": "gateway down"})))
        .mount(&server)
        .await;

    let request = BindHttpRule::new(ComponentRef::new("svc-1", "web"), 8080, "api.example.com");
    let err = stack.engine.bind_http_rule(&scope("region-a"), request).await.unwrap_err();
    assert!(!err.is_remote_not_found());

    let id = HttpRuleId::derive("api.example.com", "/");
    assert!(stack.engine.get_http_rule(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_https_rule_carries_certificate_material() {
    let server = MockServer::start().await;
    let stack = Stack::new().await;
    stack.add_region("region-a", &server.uri()).await;

    let (cert_pem, key_pem) = self_signed(&["*.example.com"]);
    let certificate = stack
        .engine
        .add_certificate(
            &EnvId::from(ENV_ID),
            NewCertificate {
                alias: "wildcard".into(),
                certificate_id: Some(CertificateId::from("cert-1")),
                certificate: cert_pem.clone(),
                private_key: key_pem,
                certificate_type: "server".into(),
            },
        )
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path(HTTP_RULE_PATH))
        .and(body_partial_json(json!({
            "protocol": "https",
            "certificate_id": "cert-1",
            "certificate_name": "wildcard",
            "certificate": cert_pem,
        })))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    let request = BindHttpRule::new(ComponentRef::new("svc-1", "web"), 8443, "shop.example.com")
        .with_certificate(HttpProtocol::Https, certificate.certificate_id.clone());
    let rules = stack.engine.bind_http_rule(&scope("region-a"), request).await.unwrap();
    assert_eq!(rules[0].protocol, HttpProtocol::Https);

    let err = stack
        .engine
        .delete_certificate(&EnvId::from(ENV_ID), &certificate.certificate_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LocalValidation(ValidationError::CertificateInUse { .. })));
}

#[tokio::test]
async fn test_certificate_update_fans_out_to_open_regions() {
    let region_a = MockServer::start().await;
    let region_b = MockServer::start().await;
    let stack = Stack::new().await;
    stack.add_region("region-a", &region_a.uri()).await;
    stack.add_region("region-b", &region_b.uri()).await;

    let (cert_pem, key_pem) = self_signed(&["*.example.com"]);
    let certificate = stack
        .engine
        .add_certificate(
            &EnvId::from(ENV_ID),
            NewCertificate {
                alias: "wildcard".into(),
                certificate_id: None,
                certificate: cert_pem,
                private_key: key_pem,
                certificate_type: "server".into(),
            },
        )
        .await
        .unwrap();

    let (renewed_cert, renewed_key) = self_signed(&["*.example.com", "example.com"]);
    Mock::given(method("PUT"))
        .and(path(CERTIFICATE_PATH))
        .and(body_partial_json(json!({"certificate": renewed_cert})))
        .respond_with(ok())
        .expect(1)
        .mount(&region_a)
        .await;
    Mock::given(method("PUT"))
        .and(path(CERTIFICATE_PATH))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&region_b)
        .await;

    let result = stack
        .engine
        .update_certificate(
            &scope("region-a"),
            &certificate.certificate_id,
            CertificateUpdate {
                alias: "wildcard".into(),
                certificate: Some(renewed_cert.clone()),
                private_key: Some(renewed_key),
                certificate_type: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(result.certificate.certificate, renewed_cert);
    assert_eq!(result.fanout.pushed, vec!["region-a".to_string()]);
    assert_eq!(result.fanout.failed.len(), 1);
    assert_eq!(result.fanout.failed[0].region_name, "region-b");
    assert!(!result.fanout.is_complete());
}

#[tokio::test]
async fn test_tcp_rule_bind_and_remote_missing_update() {
    let server = MockServer::start().await;
    let stack = Stack::new().await;
    stack.add_region("region-a", &server.uri()).await;

    Mock::given(method("POST"))
        .and(path(TCP_RULE_PATH))
        .and(body_partial_json(json!({"ip": "10.0.0.5", "port": 31000, "container_port": 5432})))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(TCP_RULE_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"code": 404, "msg": "no such rule"})))
        .expect(1)
        .mount(&server)
        .await;

    let rule = stack
        .engine
        .bind_tcp_rule(
            &scope("region-a"),
            BindTcpRule {
                component: ComponentRef::new("db-1", "db"),
                container_port: 5432,
                endpoint: "10.0.0.5:31000".into(),
                default_port: 31000,
                rule_extensions: Vec::new(),
            },
        )
        .await
        .unwrap();

    assert_eq!(rule.tcp_rule_id, TcpRuleId::derive("10.0.0.5:31000"));
    assert_eq!(rule.protocol, StreamProtocol::Tcp);
    assert!(!rule.is_custom);

    let outcome = stack
        .engine
        .update_tcp_rule(
            &scope("region-a"),
            &rule.tcp_rule_id,
            UpdateTcpRule {
                endpoint: "10.0.0.5:31001".into(),
                container_port: None,
                default_port: 31000,
                rule_extensions: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome, UpdateOutcome::RemoteMissingReplaced);

    let stored = stack.engine.get_tcp_rule(&rule.tcp_rule_id).await.unwrap().unwrap();
    assert_eq!(stored.endpoint, "10.0.0.5:31001");
    assert!(stored.is_custom);
}

#[tokio::test]
async fn test_free_port_and_gateway_ips_pass_through() {
    let server = MockServer::start().await;
    let stack = Stack::new().await;
    stack.add_region("region-a", &server.uri()).await;

    Mock::given(method("GET"))
        .and(path("/v2/gateway/ports"))
        .and(query_param("lock", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bean": 30123})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/gateway/ips"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"list": ["10.0.0.1"]})))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(stack.client.free_port("region-a", true).await.unwrap(), 30123);
    let ips = stack.engine.gateway_ips("region-a").await.unwrap();
    assert_eq!(ips, json!({"list": ["10.0.0.1"]}));

    let err = stack.engine.gateway_ips("region-z").await.unwrap_err();
    assert!(matches!(err, Error::RegionNotFound { .. }));
}

#[tokio::test]
async fn test_rule_config_round_trip() {
    let server = MockServer::start().await;
    let stack = Stack::new().await;
    stack.add_region("region-a", &server.uri()).await;

    Mock::given(method("POST")).and(path(HTTP_RULE_PATH)).respond_with(ok()).mount(&server).await;
    let rule_id = HttpRuleId::derive("api.example.com", "/");
    Mock::given(method("PUT"))
        .and(path(RULE_CONFIG_PATH))
        .and(body_partial_json(json!({
            "rule_id": rule_id.as_str(),
            "service_id": "svc-1",
            "tenant_env_id": "region-a-env-1",
            "body": {
                "set_headers": [{"item_key": "X-Env", "item_value": "prod"}],
                "proxy_send_timeout": 60,
            },
        })))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    let request = BindHttpRule::new(ComponentRef::new("svc-1", "web"), 8080, "api.example.com");
    stack.engine.bind_http_rule(&scope("region-a"), request).await.unwrap();

    let target = RuleTarget::Http(rule_id);
    let mut config = RuleConfig { set_headers: vec![HeaderSetting::new("X-Env", "prod")], ..Default::default() };
    config.parameters.insert("proxy_send_timeout".into(), json!(60));

    stack.engine.update_rule_config(&scope("region-a"), &target, config.clone()).await.unwrap();
    assert_eq!(stack.engine.get_rule_config(&target).await.unwrap(), Some(config.clone()));

    // A bad header key never reaches the region and leaves the record alone.
    let mut rejected = config.clone();
    rejected.set_headers.push(HeaderSetting::new("x env", "1"));
    let err = stack.engine.update_rule_config(&scope("region-a"), &target, rejected).await.unwrap_err();
    assert!(matches!(err, Error::LocalValidation(ValidationError::ForbiddenHeaderKey { .. })));
    assert_eq!(stack.engine.get_rule_config(&target).await.unwrap(), Some(config));
}
