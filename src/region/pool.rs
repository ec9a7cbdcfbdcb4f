//! # Region Connection Pool
//!
//! One pooled HTTP client per distinct TLS identity. Handles are shared by all
//! callers of the same identity and live until they are evicted after a TLS or
//! exhausted-retry failure. Eviction only drops the registry's reference, so
//! requests already running on an evicted handle finish on their own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::config::RegionClientConfig;
use crate::domain::RegionEndpoint;
use crate::errors::{Error, Result};
use crate::observability::metrics;

const PEM_PREFIX: &str = "-----BEGIN";

/// A pooled client bound to one TLS identity.
#[derive(Debug)]
pub struct ConnectionHandle {
    identity_key: String,
    region_name: String,
    client: reqwest::Client,
    created_at: Instant,
}

impl ConnectionHandle {
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    pub fn region_name(&self) -> &str {
        &self.region_name
    }

    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

/// Identity key of an endpoint: SHA-256 over the base URL, TLS material and
/// verification flag, fields separated by a NUL byte.
pub fn identity_key(endpoint: &RegionEndpoint) -> String {
    let mut hasher = Sha256::new();
    for part in [
        endpoint.base_url.as_str(),
        endpoint.ca_cert.as_deref().unwrap_or_default(),
        endpoint.client_cert.as_deref().unwrap_or_default(),
        endpoint.client_key.as_deref().unwrap_or_default(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update([u8::from(endpoint.verify_tls)]);
    hex::encode(hasher.finalize())
}

/// Registry of pooled clients keyed by TLS identity.
#[derive(Debug)]
pub struct ConnectionPoolManager {
    config: RegionClientConfig,
    handles: Mutex<HashMap<String, Arc<ConnectionHandle>>>,
}

impl ConnectionPoolManager {
    pub fn new(config: RegionClientConfig) -> Self {
        Self { config, handles: Mutex::new(HashMap::new()) }
    }

    pub fn config(&self) -> &RegionClientConfig {
        &self.config
    }

    /// Return the cached handle for the endpoint's identity, building one on a miss.
    ///
    /// Lookup and creation happen under one lock, so concurrent callers never
    /// build two clients for the same identity.
    #[instrument(skip(self, endpoint), fields(region = %endpoint.region_name))]
    pub async fn get_client(&self, endpoint: &RegionEndpoint) -> Result<Arc<ConnectionHandle>> {
        let key = identity_key(endpoint);
        let mut handles = self.handles.lock().await;

        if let Some(handle) = handles.get(&key) {
            return Ok(Arc::clone(handle));
        }

        let client = build_client(endpoint, &self.config).await?;
        let handle = Arc::new(ConnectionHandle {
            identity_key: key.clone(),
            region_name: endpoint.region_name.clone(),
            client,
            created_at: Instant::now(),
        });
        handles.insert(key, Arc::clone(&handle));
        metrics::record_pool_client_created();

        info!(
            region = %endpoint.region_name,
            verify_tls = endpoint.verify_tls,
            mtls = endpoint.has_client_identity(),
            "Created pooled region client"
        );
        Ok(handle)
    }

    /// Drop whatever handle is cached for the endpoint's identity.
    pub async fn evict(&self, endpoint: &RegionEndpoint) -> bool {
        let key = identity_key(endpoint);
        let removed = self.handles.lock().await.remove(&key).is_some();
        if removed {
            metrics::record_pool_eviction("explicit");
            info!(region = %endpoint.region_name, "Evicted pooled region client");
        }
        removed
    }

    /// Drop `handle` if it is still the cached one. A replacement created by
    /// another task in the meantime is left alone.
    pub async fn evict_handle(&self, handle: &Arc<ConnectionHandle>, reason: &'static str) -> bool {
        let mut handles = self.handles.lock().await;
        let current = handles.get(handle.identity_key()).is_some_and(|h| Arc::ptr_eq(h, handle));
        if current {
            handles.remove(handle.identity_key());
            metrics::record_pool_eviction(reason);
            info!(region = %handle.region_name(), reason, "Evicted pooled region client");
        } else {
            debug!(region = %handle.region_name(), "Handle already replaced, nothing to evict");
        }
        current
    }

    /// Number of live handles.
    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// TLS material is either inline PEM or a path to a PEM file.
async fn load_pem(material: &str, what: &str) -> Result<Vec<u8>> {
    let trimmed = material.trim_start();
    if trimmed.starts_with(PEM_PREFIX) {
        return Ok(trimmed.as_bytes().to_vec());
    }

    tokio::fs::read(material).await.map_err(|e| Error::Io {
        source: e,
        context: format!("Failed to read {} from {}", what, material),
    })
}

async fn build_client(endpoint: &RegionEndpoint, config: &RegionClientConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .connect_timeout(config.connect_timeout())
        .pool_max_idle_per_host(config.pool_size)
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(!endpoint.verify_tls);

    if let Some(ca) = endpoint.ca_cert.as_deref().filter(|c| !c.is_empty()) {
        let pem = load_pem(ca, "CA certificate").await?;
        let roots = reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
            Error::config(format!("Invalid CA certificate for region {}: {}", endpoint.region_name, e))
        })?;
        for root in roots {
            builder = builder.add_root_certificate(root);
        }
    }

    if let (Some(cert), Some(key)) = (
        endpoint.client_cert.as_deref().filter(|c| !c.is_empty()),
        endpoint.client_key.as_deref().filter(|k| !k.is_empty()),
    ) {
        let mut identity = load_pem(cert, "client certificate").await?;
        identity.push(b'\n');
        identity.extend(load_pem(key, "client key").await?);
        let identity = reqwest::Identity::from_pem(&identity).map_err(|e| {
            Error::config(format!("Invalid client identity for region {}: {}", endpoint.region_name, e))
        })?;
        builder = builder.identity(identity);
    }

    builder.build().map_err(|e| {
        Error::config(format!("Failed to build client for region {}: {}", endpoint.region_name, e))
    })
}
