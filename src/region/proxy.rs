//! # Reverse Proxy Forwarder
//!
//! Relays an inbound request to a service behind a region controller and hands
//! the upstream response back. Used for pass-through features where the
//! console only relays traffic. Failures are logged and degrade to `None` so
//! the caller can answer with its own proxy error.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, RawQuery, State};
use axum::http::header::{
    HeaderName, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HOST, LOCATION,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use url::Url;

use super::client::RegionClient;
use super::executor::resolve_token;
use crate::errors::{Error, Result, TransportErrorKind, CLUSTER_COMMUNICATION_ERROR};

/// Response headers that must not be relayed.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "content-encoding",
    "content-length",
];

const CONTENT_SECURITY_POLICY: &str = "upgrade-insecure-requests";

/// The parts of an inbound request that are relayed.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Option<String>,
    pub body: Bytes,
}

#[derive(Clone)]
pub struct ReverseProxyForwarder {
    client: RegionClient,
}

impl ReverseProxyForwarder {
    pub fn new(client: RegionClient) -> Self {
        Self { client }
    }

    /// Forward `request` to `target_path` on the named region.
    pub async fn forward(&self, region_name: &str, target_path: &str, request: ProxyRequest) -> Option<Response> {
        match self.try_forward(region_name, target_path, request).await {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(region = %region_name, path = %target_path, error = %e, "Proxy request failed");
                None
            }
        }
    }

    async fn try_forward(&self, region_name: &str, target_path: &str, request: ProxyRequest) -> Result<Response> {
        let endpoint = self.client.resolve(region_name).await?;
        let handle = self.client.executor().pool().get_client(&endpoint).await?;
        let config = self.client.config();

        let mut url = endpoint.url_for(target_path);
        if let Some(query) = request.query.as_deref().filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }

        let mut headers = request.headers;
        headers.remove(HOST);
        headers.remove(CONTENT_LENGTH);
        // Bodies are relayed as received, so ask upstream for an unencoded response.
        headers.remove(ACCEPT_ENCODING);
        headers.remove(AUTHORIZATION);
        if let Some(token) = resolve_token(&endpoint, config.fallback_token.as_deref()) {
            let value = HeaderValue::from_str(token)
                .map_err(|_| Error::config(format!("Token for region {} is not a valid header value", region_name)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut outbound = handle
            .client()
            .request(request.method.clone(), &url)
            .timeout(config.proxy_timeout());

        if is_empty_json_object(&request.body) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            outbound = outbound.headers(headers).body("{}");
        } else {
            outbound = outbound.headers(headers).body(request.body);
        }

        let upstream = match outbound.send().await {
            Ok(upstream) => upstream,
            Err(e) => {
                return Err(self.client.executor().transport_failure(&handle, &request.method, &url, &e).await)
            }
        };

        let status = upstream.status();
        let upstream_url = upstream.url().clone();
        let mut relayed = relay_headers(upstream.headers(), &upstream_url);
        let body = upstream.bytes().await.map_err(|e| {
            Error::transport(TransportErrorKind::Other, request.method.as_str(), &url, e.to_string())
        })?;

        debug!(status = status.as_u16(), url = %url, "Proxied region response");

        relayed.insert(
            HeaderName::from_static("content-security-policy"),
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        );

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = relayed;
        Ok(response)
    }
}

fn is_empty_json_object(body: &[u8]) -> bool {
    matches!(serde_json::from_slice::<Value>(body), Ok(Value::Object(map)) if map.is_empty())
}

/// Copy upstream headers, dropping hop-by-hop ones and making `Location` absolute.
fn relay_headers(upstream: &HeaderMap, upstream_url: &Url) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len() + 1);
    for (name, value) in upstream {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        if name == LOCATION {
            if let Some(absolute) = absolute_location(value, upstream_url) {
                headers.append(name.clone(), absolute);
                continue;
            }
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Resolve a possibly relative `Location` against the upstream URL. Covers
/// scheme-relative, host-relative and path-relative forms.
fn absolute_location(value: &HeaderValue, base: &Url) -> Option<HeaderValue> {
    let location = value.to_str().ok()?;
    let resolved = base.join(location).ok()?;
    HeaderValue::from_str(resolved.as_str()).ok()
}

// ============================================================================
// HTTP Surface
// ============================================================================

/// Router exposing the forwarder at `/proxy/{region}/{*path}`.
pub fn router(forwarder: Arc<ReverseProxyForwarder>) -> Router {
    Router::new().route("/proxy/{region}/{*path}", any(proxy_handler)).with_state(forwarder)
}

async fn proxy_handler(
    State(forwarder): State<Arc<ReverseProxyForwarder>>,
    Path((region, path)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let request = ProxyRequest { method, headers, query, body };
    match forwarder.forward(&region, &path, request).await {
        Some(response) => response,
        None => (StatusCode::BAD_GATEWAY, Json(json!({ "msg": CLUSTER_COMMUNICATION_ERROR })))
            .into_response(),
    }
}

/// Serve the proxy router until ctrl-c.
pub async fn serve(addr: SocketAddr, forwarder: Arc<ReverseProxyForwarder>) -> Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(|e| Error::Io {
        source: e,
        context: format!("Failed to bind proxy listener on {}", addr),
    })?;

    info!(address = %addr, "Starting region proxy");
    axum::serve(listener, router(forwarder))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Proxy shutdown listener failed");
            }
        })
        .await
        .map_err(|e| Error::Io { source: e, context: "Region proxy server error".to_string() })?;

    info!("Region proxy shutdown completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionClientConfig;
    use crate::domain::RegionEndpoint;
    use crate::region::client::test_support::StaticRegistry;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn forwarder(server: &MockServer) -> ReverseProxyForwarder {
        let registry =
            StaticRegistry::with([RegionEndpoint::new("region-a", server.uri()).with_token("region-token")]);
        ReverseProxyForwarder::new(RegionClient::new(Arc::new(registry), RegionClientConfig::default()))
    }

    fn request(method: Method, body: &'static str) -> ProxyRequest {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("console.local"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("console-session"));
        headers.insert("x-trace", HeaderValue::from_static("abc"));
        ProxyRequest { method, headers, query: None, body: Bytes::from_static(body.as_bytes()) }
    }

    #[test]
    fn test_location_resolution() {
        let base = Url::parse("https://region.local:8443/console/files/list").unwrap();
        let cases = [
            ("https://other.local/x", "https://other.local/x"),
            ("//cdn.local/a.js", "https://cdn.local/a.js"),
            ("/login", "https://region.local:8443/login"),
            ("detail?id=1", "https://region.local:8443/console/files/detail?id=1"),
        ];
        for (location, expected) in cases {
            let resolved = absolute_location(&HeaderValue::from_static(location), &base).unwrap();
            assert_eq!(resolved, expected);
        }
    }

    #[test]
    fn test_empty_object_detection() {
        assert!(is_empty_json_object(b"{}"));
        assert!(is_empty_json_object(b" { } "));
        assert!(!is_empty_json_object(b"{\"a\":1}"));
        assert!(!is_empty_json_object(b""));
        assert!(!is_empty_json_object(b"[]"));
    }

    #[tokio::test]
    async fn test_forward_relays_status_body_and_strips_hop_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/console/files"))
            .and(query_param("dir", "/data"))
            .and(header("authorization", "region-token"))
            .and(header("x-trace", "abc"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("keep-alive", "timeout=5")
                    .insert_header("x-upstream", "yes")
                    .insert_header("location", "/console/files/1")
                    .set_body_string("created"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut inbound = request(Method::GET, "");
        inbound.query = Some("dir=/data".into());
        let response = forwarder(&server).forward("region-a", "console/files", inbound).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let headers = response.headers();
        assert!(headers.get("keep-alive").is_none());
        assert!(headers.get(CONTENT_LENGTH).is_none());
        assert_eq!(headers["x-upstream"], "yes");
        assert_eq!(headers["content-security-policy"], CONTENT_SECURITY_POLICY);
        assert_eq!(headers[LOCATION], format!("{}/console/files/1", server.uri()));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"created");
    }

    #[tokio::test]
    async fn test_empty_object_body_is_sent_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string("{}"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(body_string("name=a&b=c"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let forwarder = forwarder(&server);
        let posted = forwarder.forward("region-a", "/x", request(Method::POST, " {} ")).await.unwrap();
        assert_eq!(posted.status(), StatusCode::OK);
        let put = forwarder.forward("region-a", "/x", request(Method::PUT, "name=a&b=c")).await.unwrap();
        assert_eq!(put.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_failures_degrade_to_none() {
        let server = MockServer::start().await;
        let forwarder = forwarder(&server);
        assert!(forwarder.forward("unknown-region", "/x", request(Method::GET, "")).await.is_none());

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let registry = StaticRegistry::with([RegionEndpoint::new("down", format!("http://127.0.0.1:{port}"))]);
        let down = ReverseProxyForwarder::new(RegionClient::new(Arc::new(registry), RegionClientConfig::default()));
        assert!(down.forward("down", "/x", request(Method::GET, "")).await.is_none());
    }

    #[tokio::test]
    async fn test_tls_failure_evicts_pooled_handle() {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(b"plain text, no handshake\r\n").await;
                let _ = socket.shutdown().await;
            }
        });

        let registry = StaticRegistry::with([RegionEndpoint::new("plain", format!("https://{addr}"))]);
        let forwarder = ReverseProxyForwarder::new(RegionClient::new(Arc::new(registry), RegionClientConfig::default()));

        assert!(forwarder.forward("plain", "/x", request(Method::GET, "")).await.is_none());
        assert!(forwarder.client.executor().pool().is_empty().await);
    }

    #[tokio::test]
    async fn test_router_answers_bad_gateway_when_forwarding_fails() {
        let server = MockServer::start().await;
        let app = router(Arc::new(forwarder(&server)));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/proxy/unknown-region/files/list")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
