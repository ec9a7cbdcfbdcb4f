//! Region-name addressed client used by the gateway engine and ad-hoc callers.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::instrument;

use super::executor::{RequestExecutor, RequestOptions};
use super::pool::ConnectionPoolManager;
use super::response::RegionResponse;
use crate::config::RegionClientConfig;
use crate::domain::RegionEndpoint;
use crate::errors::Result;
use crate::storage::RegionEndpointRegistry;

/// Liveness and version endpoint of a region controller.
pub const PROBE_PATH: &str = "/v2/show";

/// Resolves a region by name on every call and executes against it.
#[derive(Clone)]
pub struct RegionClient {
    registry: Arc<dyn RegionEndpointRegistry>,
    executor: RequestExecutor,
}

impl RegionClient {
    pub fn new(registry: Arc<dyn RegionEndpointRegistry>, config: RegionClientConfig) -> Self {
        let pool = Arc::new(ConnectionPoolManager::new(config));
        Self { registry, executor: RequestExecutor::new(pool) }
    }

    pub fn with_executor(registry: Arc<dyn RegionEndpointRegistry>, executor: RequestExecutor) -> Self {
        Self { registry, executor }
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn config(&self) -> &RegionClientConfig {
        self.executor.pool().config()
    }

    /// Current connection descriptor for a region.
    pub async fn resolve(&self, region_name: &str) -> Result<RegionEndpoint> {
        self.registry.resolve(region_name).await
    }

    /// Call a region with the configured timeout and retry budget.
    pub async fn call(
        &self,
        region_name: &str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RegionResponse> {
        self.call_with(region_name, method, path, body, RequestOptions::default()).await
    }

    #[instrument(skip(self, body), fields(region = %region_name, method = %method, path = %path))]
    pub async fn call_with(
        &self,
        region_name: &str,
        method: Method,
        path: &str,
        body: Option<&Value>,
        options: RequestOptions,
    ) -> Result<RegionResponse> {
        let endpoint = self.resolve(region_name).await?;
        self.executor.execute(&endpoint, method, path, body, options).await
    }

    /// Unbuffered response for downloads and other large payloads.
    pub async fn stream(&self, region_name: &str, method: Method, path: &str) -> Result<reqwest::Response> {
        let endpoint = self.resolve(region_name).await?;
        self.executor.execute_stream(&endpoint, method, path).await
    }

    /// Version information reported by the region, using a short deadline.
    pub async fn probe(&self, region_name: &str) -> Result<Value> {
        let response = self
            .call_with(region_name, Method::GET, PROBE_PATH, None, RequestOptions::probe())
            .await?;
        Ok(response.into_body())
    }

    /// Drop the pooled client for a region, forcing a rebuild on next use.
    pub async fn evict(&self, region_name: &str) -> Result<bool> {
        let endpoint = self.resolve(region_name).await?;
        Ok(self.executor.pool().evict(&endpoint).await)
    }
}
