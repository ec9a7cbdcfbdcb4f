//! # Request Executor
//!
//! Issues a single call to a region controller over a pooled client, applies
//! the timeout and retry policy, and turns transport and status failures into
//! the crate's error taxonomy.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONNECTION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, error, warn, Instrument};

use super::pool::{ConnectionHandle, ConnectionPoolManager};
use super::response::{classify_failure, decode_success, RegionResponse};
use super::retry::{FlatRetry, RetryPolicy};
use crate::domain::RegionEndpoint;
use crate::errors::{Error, Result, TransportErrorKind};
use crate::observability::metrics;
use crate::region_span;

/// Per-call overrides of the configured timeout and retry budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
}

impl RequestOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Short deadline and a single retry, for liveness checks.
    pub fn probe() -> Self {
        Self { timeout: Some(Duration::from_secs(1)), retries: Some(1) }
    }
}

/// Executes calls against region controllers.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    pool: Arc<ConnectionPoolManager>,
    policy: Arc<dyn RetryPolicy>,
}

impl RequestExecutor {
    /// Executor with a flat retry budget taken from the pool's configuration.
    pub fn new(pool: Arc<ConnectionPoolManager>) -> Self {
        let policy = Arc::new(FlatRetry::new(pool.config().retries));
        Self { pool, policy }
    }

    pub fn with_policy(pool: Arc<ConnectionPoolManager>, policy: Arc<dyn RetryPolicy>) -> Self {
        Self { pool, policy }
    }

    pub fn pool(&self) -> &Arc<ConnectionPoolManager> {
        &self.pool
    }

    /// Send a request and decode the response.
    ///
    /// 2xx and 3xx responses succeed; anything else is classified into an error.
    pub async fn execute(
        &self,
        endpoint: &RegionEndpoint,
        method: Method,
        path: &str,
        body: Option<&Value>,
        options: RequestOptions,
    ) -> Result<RegionResponse> {
        let span = region_span!(endpoint.region_name, method, path);
        async move {
            let url = endpoint.url_for(path);
            let started = Instant::now();
            let timeout = options.timeout.unwrap_or_else(|| self.pool.config().read_timeout());
            let retries = options.retries.unwrap_or_else(|| self.policy.max_retries());

            let result = self.send_and_read(endpoint, &method, &url, body, Some(timeout), retries).await;
            let outcome = match &result {
                Ok(_) => "success",
                Err(Error::Transport { .. }) => "transport_error",
                Err(_) => "rejected",
            };
            metrics::record_region_request(&endpoint.region_name, method.as_str(), outcome, started.elapsed());

            if let Err(e) = &result {
                warn!(error = %e, url = %url, "Region call failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Send a request and hand back the live response without buffering or
    /// checking its status. No read deadline applies; the caller owns the body.
    pub async fn execute_stream(
        &self,
        endpoint: &RegionEndpoint,
        method: Method,
        path: &str,
    ) -> Result<reqwest::Response> {
        let span = region_span!(endpoint.region_name, method, path, streaming = true);
        async move {
            let url = endpoint.url_for(path);
            let (_, response) =
                self.send(endpoint, &method, &url, None, None, self.policy.max_retries()).await?;
            Ok(response)
        }
        .instrument(span)
        .await
    }

    async fn send_and_read(
        &self,
        endpoint: &RegionEndpoint,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        timeout: Option<Duration>,
        retries: u32,
    ) -> Result<RegionResponse> {
        let (handle, response) = self.send(endpoint, method, url, body, timeout, retries).await?;
        let status = response.status();

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.transport_failure(&handle, method, url, &e).await),
        };

        debug!(status = status.as_u16(), body_len = bytes.len(), "Region responded");

        if status.is_client_error() || status.is_server_error() {
            return Err(classify_failure(status, method.as_str(), url, &bytes));
        }
        Ok(RegionResponse::new(status, decode_success(&bytes)))
    }

    async fn send(
        &self,
        endpoint: &RegionEndpoint,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        timeout: Option<Duration>,
        retries: u32,
    ) -> Result<(Arc<ConnectionHandle>, reqwest::Response)> {
        let headers = self.headers(endpoint)?;
        let payload = body.map(Value::to_string);
        let mut attempt = 0;

        loop {
            let handle = self.pool.get_client(endpoint).await?;
            let mut request = handle.client().request(method.clone(), url).headers(headers.clone());
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }
            if let Some(payload) = &payload {
                request = request.body(payload.clone());
            }

            let err = match request.send().await {
                Ok(response) => return Ok((handle, response)),
                Err(e) => e,
            };

            let kind = transport_kind(&err);
            if !matches!(kind, TransportErrorKind::Connect | TransportErrorKind::Other)
                || !self.policy.should_retry(attempt, method, kind)
            {
                return Err(self.transport_failure(&handle, method, url, &err).await);
            }

            if attempt >= retries {
                error!(error = %err, attempts = attempt + 1, url = %url, "Retries exhausted");
                self.pool.evict_handle(&handle, "max_retries").await;
                return Err(Error::transport(
                    TransportErrorKind::MaxRetries,
                    method.as_str(),
                    url,
                    err.to_string(),
                ));
            }

            warn!(error = %err, attempt = attempt + 1, url = %url, "Region call failed, retrying");
            let delay = self.policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    /// Classify a failed send, evicting the handle when TLS is to blame.
    pub(crate) async fn transport_failure(
        &self,
        handle: &Arc<ConnectionHandle>,
        method: &Method,
        url: &str,
        err: &reqwest::Error,
    ) -> Error {
        let kind = transport_kind(err);
        if kind == TransportErrorKind::Tls {
            error!(error = %err, url = %url, "TLS failure talking to region");
            self.pool.evict_handle(handle, "tls").await;
        }
        Error::transport(kind, method.as_str(), url, err.to_string())
    }

    fn headers(&self, endpoint: &RegionEndpoint) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = resolve_token(endpoint, self.pool.config().fallback_token.as_deref()) {
            let mut value = HeaderValue::from_str(token).map_err(|_| {
                Error::config(format!("Token for region {} is not a valid header value", endpoint.region_name))
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

/// The endpoint's own token, or the fallback when it has none.
pub(crate) fn resolve_token<'a>(endpoint: &'a RegionEndpoint, fallback: Option<&'a str>) -> Option<&'a str> {
    if endpoint.bearer_token.is_empty() {
        fallback.filter(|t| !t.is_empty())
    } else {
        Some(endpoint.bearer_token.as_str())
    }
}

fn transport_kind(err: &reqwest::Error) -> TransportErrorKind {
    if is_tls_failure(err) {
        TransportErrorKind::Tls
    } else if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Other
    }
}

fn is_tls_failure(err: &reqwest::Error) -> bool {
    err.source().is_some_and(contains_rustls_error)
}

/// True when a rustls error sits anywhere below `err`. The connector nests it
/// inside `io::Error`s, and `io::Error::source` skips the wrapped error, so
/// those are entered through `get_ref`.
pub(crate) fn contains_rustls_error(err: &(dyn StdError + 'static)) -> bool {
    if err.downcast_ref::<rustls::Error>().is_some() {
        return true;
    }
    if let Some(inner) = err.downcast_ref::<std::io::Error>().and_then(|io| io.get_ref()) {
        if contains_rustls_error(inner) {
            return true;
        }
    }
    err.source().is_some_and(contains_rustls_error)
}
