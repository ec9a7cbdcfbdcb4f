use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use regionctl::domain::RegionEndpoint;
use regionctl::region::{proxy, ReverseProxyForwarder};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::Stack;

async fn body_json_of(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_proxy_route_relays_to_registered_region() {
    let server = MockServer::start().await;
    let stack = Stack::new().await;
    stack.add_region("region-a", &server.uri()).await;

    Mock::given(method("PUT"))
        .and(path("/v2/nodes/n1/labels"))
        .and(query_param("force", "1"))
        .and(header("authorization", "test-token"))
        .and(body_json(json!({"zone": "east"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("connection", "close")
                .set_body_json(json!({"bean": {"zone": "east"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let app = proxy::router(Arc::new(ReverseProxyForwarder::new(stack.client.clone())));
    let request = Request::builder()
        .method("PUT")
        .uri("/proxy/region-a/v2/nodes/n1/labels?force=1")
        .header("authorization", "console-session")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"zone":"east"}"#))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("connection").is_none());
    assert_eq!(response.headers()["content-security-policy"], "upgrade-insecure-requests");
    assert_eq!(body_json_of(response).await, json!({"bean": {"zone": "east"}}));
}

#[tokio::test]
async fn test_proxy_picks_up_rotated_token() {
    let server = MockServer::start().await;
    let stack = Stack::new().await;
    stack.add_region("region-a", &server.uri()).await;

    Mock::given(method("GET"))
        .and(path("/console/status"))
        .and(header("authorization", "rotated-token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let rotated = RegionEndpoint::new("region-a", server.uri()).with_token("rotated-token");
    stack.regions.upsert(&rotated).await.unwrap();

    let app = proxy::router(Arc::new(ReverseProxyForwarder::new(stack.client.clone())));
    let request = Request::builder().uri("/proxy/region-a/console/status").body(Body::empty()).unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_unknown_region_answers_bad_gateway() {
    let stack = Stack::new().await;
    let app = proxy::router(Arc::new(ReverseProxyForwarder::new(stack.client.clone())));

    let request = Request::builder().uri("/proxy/region-z/v2/show").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json_of(response).await;
    assert!(body["msg"].as_str().is_some_and(|m| !m.is_empty()));
}
