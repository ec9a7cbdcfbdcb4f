use std::sync::Arc;

use regionctl::domain::RegionEndpoint;
use regionctl::errors::{Error, TransportErrorKind};
use regionctl::region::{ConnectionPoolManager, RequestExecutor, RequestOptions};
use reqwest::Method;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::client_config;

/// Accepts connections and answers every one with bytes that are not a TLS record.
async fn plaintext_listener() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(b"this is not a tls server\r\n").await;
            let _ = socket.shutdown().await;
        }
    });
    format!("https://{}", addr)
}

#[tokio::test]
async fn test_tls_failure_evicts_pooled_client() {
    let rustls_provider = rustls::crypto::ring::default_provider();
    let _ = rustls_provider.install_default();

    let base_url = plaintext_listener().await;
    let pool = Arc::new(ConnectionPoolManager::new(client_config()));
    let executor = RequestExecutor::new(pool.clone());
    let endpoint = RegionEndpoint::new("region-a", base_url);

    let before = pool.get_client(&endpoint).await.unwrap();
    let err = executor
        .execute(&endpoint, Method::GET, "/v2/show", None, RequestOptions::default())
        .await
        .unwrap_err();

    match err {
        Error::Transport { kind, .. } => assert_eq!(kind, TransportErrorKind::Tls),
        other => panic!("expected TLS transport error, got {other:?}"),
    }
    assert!(pool.is_empty().await);

    let after = pool.get_client(&endpoint).await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
}

#[tokio::test]
async fn test_connect_failure_exhausts_retries_and_evicts() {
    // Reserve a port, then close it so nothing is listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let pool = Arc::new(ConnectionPoolManager::new(client_config()));
    let executor = RequestExecutor::new(pool.clone());
    let endpoint = RegionEndpoint::new("region-a", format!("http://{}", addr));

    let err = executor
        .execute(&endpoint, Method::GET, "/v2/show", None, RequestOptions::default().with_retries(1))
        .await
        .unwrap_err();

    match err {
        Error::Transport { kind, method, .. } => {
            assert_eq!(kind, TransportErrorKind::MaxRetries);
            assert_eq!(method, "GET");
        }
        other => panic!("expected transport error, got {other:?}"),
    }
    assert!(pool.is_empty().await);
}

#[tokio::test]
async fn test_rotated_token_reuses_pooled_client() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/show"))
        .and(header("authorization", "rotated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"version": "5.2"})))
        .expect(1)
        .mount(&server)
        .await;

    let pool = Arc::new(ConnectionPoolManager::new(client_config()));
    let executor = RequestExecutor::new(pool.clone());

    let original = RegionEndpoint::new("region-a", server.uri()).with_token("original");
    let first = pool.get_client(&original).await.unwrap();

    let rotated = original.clone().with_token("rotated");
    let response = executor
        .execute(&rotated, Method::GET, "/v2/show", None, RequestOptions::probe())
        .await
        .unwrap();

    assert_eq!(response.body["version"], "5.2");
    assert!(Arc::ptr_eq(&first, &pool.get_client(&rotated).await.unwrap()));
    assert_eq!(pool.len().await, 1);
}
