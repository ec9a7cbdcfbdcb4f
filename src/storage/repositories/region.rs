//! Region controller connection records.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::FromRow;
use tracing::instrument;

use crate::domain::RegionEndpoint;
use crate::errors::{Error, Result};
use crate::storage::DbPool;

// ============================================================================
// Database Row Type
// ============================================================================

#[derive(Debug, Clone, FromRow)]
struct RegionRow {
    region_name: String,
    base_url: String,
    token: String,
    verify_tls: bool,
    ca_cert: Option<String>,
    client_cert: Option<String>,
    client_key: Option<String>,
    http_domain: Option<String>,
    tcp_domain: Option<String>,
}

impl From<RegionRow> for RegionEndpoint {
    fn from(row: RegionRow) -> Self {
        RegionEndpoint {
            region_name: row.region_name,
            base_url: row.base_url,
            bearer_token: row.token,
            verify_tls: row.verify_tls,
            ca_cert: row.ca_cert,
            client_cert: row.client_cert,
            client_key: row.client_key,
            http_domain: row.http_domain,
            tcp_domain: row.tcp_domain,
        }
    }
}

// ============================================================================
// Registry Trait
// ============================================================================

/// Resolves a region name to its current connection descriptor.
#[async_trait]
pub trait RegionEndpointRegistry: Send + Sync {
    /// Fails with `RegionNotFound` when the region is not registered.
    async fn resolve(&self, region_name: &str) -> Result<RegionEndpoint>;
}

// ============================================================================
// SQLx Implementation
// ============================================================================

#[derive(Debug, Clone)]
pub struct SqlxRegionRepository {
    pool: DbPool,
}

impl SqlxRegionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Register a region or replace its connection details.
    #[instrument(skip(self, endpoint), fields(region = %endpoint.region_name), name = "db_upsert_region")]
    pub async fn upsert(&self, endpoint: &RegionEndpoint) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO region_configs (
                region_name, base_url, token, verify_tls, ca_cert, client_cert,
                client_key, http_domain, tcp_domain, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            ON CONFLICT (region_name) DO UPDATE SET
                base_url = excluded.base_url,
                token = excluded.token,
                verify_tls = excluded.verify_tls,
                ca_cert = excluded.ca_cert,
                client_cert = excluded.client_cert,
                client_key = excluded.client_key,
                http_domain = excluded.http_domain,
                tcp_domain = excluded.tcp_domain,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&endpoint.region_name)
        .bind(&endpoint.base_url)
        .bind(&endpoint.bearer_token)
        .bind(endpoint.verify_tls)
        .bind(endpoint.ca_cert.as_deref())
        .bind(endpoint.client_cert.as_deref())
        .bind(endpoint.client_key.as_deref())
        .bind(endpoint.http_domain.as_deref())
        .bind(endpoint.tcp_domain.as_deref())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to upsert region: {}", endpoint.region_name)))?;

        Ok(())
    }

    #[instrument(skip(self), name = "db_list_regions")]
    pub async fn list(&self) -> Result<Vec<RegionEndpoint>> {
        let rows = sqlx::query_as::<_, RegionRow>(
            r#"
            SELECT region_name, base_url, token, verify_tls, ca_cert, client_cert,
                   client_key, http_domain, tcp_domain
            FROM region_configs ORDER BY region_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::database(e, "Failed to list regions"))?;

        Ok(rows.into_iter().map(RegionEndpoint::from).collect())
    }
}

#[async_trait]
impl RegionEndpointRegistry for SqlxRegionRepository {
    #[instrument(skip(self), fields(region = %region_name), name = "db_resolve_region")]
    async fn resolve(&self, region_name: &str) -> Result<RegionEndpoint> {
        let row = sqlx::query_as::<_, RegionRow>(
            r#"
            SELECT region_name, base_url, token, verify_tls, ca_cert, client_cert,
                   client_key, http_domain, tcp_domain
            FROM region_configs WHERE region_name = $1
            "#,
        )
        .bind(region_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to resolve region: {}", region_name)))?;

        row.map(RegionEndpoint::from).ok_or_else(|| Error::region_not_found(region_name))
    }
}
