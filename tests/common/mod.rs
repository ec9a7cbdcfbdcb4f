//! Shared helpers for integration tests: an in-memory store, region
//! registration against mock controllers and throwaway certificates.

#![allow(dead_code)]

use std::sync::Arc;

use regionctl::config::{DatabaseConfig, RegionClientConfig};
use regionctl::domain::{EnvId, GatewayScope, RegionEndpoint};
use regionctl::region::{GatewayApi, RegionClient};
use regionctl::services::{GatewayRepositories, GatewayRuleSyncEngine};
use regionctl::storage::{create_pool, DbPool, SqlxEnvRegionRepository, SqlxRegionRepository};

pub const TENANT: &str = "acme";
pub const ENV_NAME: &str = "prod";
pub const ENV_ID: &str = "env-1";

/// Fresh migrated in-memory database.
pub async fn test_pool() -> DbPool {
    create_pool(&DatabaseConfig::in_memory()).await.expect("create in-memory database")
}

/// Client config without retries so failure tests stay fast.
pub fn client_config() -> RegionClientConfig {
    RegionClientConfig { retries: 0, ..RegionClientConfig::default() }
}

pub fn scope(region_name: &str) -> GatewayScope {
    GatewayScope {
        tenant_name: TENANT.into(),
        env_name: ENV_NAME.into(),
        env_id: EnvId::from(ENV_ID),
        region_name: region_name.into(),
        region_tenant_env_id: format!("{}-{}", region_name, ENV_ID),
    }
}

/// Everything wired against the real client and sqlx repositories.
pub struct Stack {
    pub pool: DbPool,
    pub regions: Arc<SqlxRegionRepository>,
    pub client: RegionClient,
    pub engine: GatewayRuleSyncEngine,
}

impl Stack {
    pub async fn new() -> Self {
        let pool = test_pool().await;
        let regions = Arc::new(SqlxRegionRepository::new(pool.clone()));
        let client = RegionClient::new(regions.clone(), client_config());
        let api: Arc<dyn GatewayApi> = Arc::new(client.clone());
        let engine = GatewayRuleSyncEngine::new(api, regions.clone(), GatewayRepositories::sqlx(pool.clone()));
        Self { pool, regions, client, engine }
    }

    /// Register a region served by `base_url` and attach the test environment to it.
    pub async fn add_region(&self, region_name: &str, base_url: &str) {
        let mut endpoint = RegionEndpoint::new(region_name, base_url).with_token("test-token");
        endpoint.http_domain = Some(format!("apps.{}.local", region_name));
        self.regions.upsert(&endpoint).await.expect("register region");

        SqlxEnvRegionRepository::new(self.pool.clone())
            .attach(&EnvId::from(ENV_ID), region_name, &format!("{}-{}", region_name, ENV_ID))
            .await
            .expect("attach environment");
    }
}

/// Self-signed PEM certificate and key covering `names`.
pub fn self_signed(names: &[&str]) -> (String, String) {
    let key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).expect("generate key");
    let params = rcgen::CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>())
        .expect("certificate params");
    let cert = params.self_signed(&key).expect("self sign");
    (cert.pem(), key.serialize_pem())
}
