//! Which regions serve a tenant environment.

use async_trait::async_trait;
use tracing::instrument;

use crate::domain::EnvId;
use crate::errors::{Error, Result};
use crate::storage::DbPool;

#[async_trait]
pub trait EnvRegionRepository: Send + Sync {
    /// Names of the regions an environment is currently open in.
    async fn list_open_regions(&self, env_id: &EnvId) -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct SqlxEnvRegionRepository {
    pool: DbPool,
}

impl SqlxEnvRegionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open (or re-open) an environment in a region.
    #[instrument(skip(self), fields(env_id = %env_id, region = %region_name), name = "db_attach_env_region")]
    pub async fn attach(
        &self,
        env_id: &EnvId,
        region_name: &str,
        region_tenant_env_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO env_regions (env_id, region_name, region_tenant_env_id, is_active)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (env_id, region_name) DO UPDATE SET
                region_tenant_env_id = excluded.region_tenant_env_id,
                is_active = 1
            "#,
        )
        .bind(env_id)
        .bind(region_name)
        .bind(region_tenant_env_id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to attach {} to {}", env_id, region_name)))?;

        Ok(())
    }

    #[instrument(skip(self), fields(env_id = %env_id, region = %region_name), name = "db_close_env_region")]
    pub async fn close(&self, env_id: &EnvId, region_name: &str) -> Result<()> {
        sqlx::query("UPDATE env_regions SET is_active = 0 WHERE env_id = $1 AND region_name = $2")
            .bind(env_id)
            .bind(region_name)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::database(e, format!("Failed to close {} in {}", env_id, region_name)))?;

        Ok(())
    }
}

#[async_trait]
impl EnvRegionRepository for SqlxEnvRegionRepository {
    #[instrument(skip(self), fields(env_id = %env_id), name = "db_list_open_regions")]
    async fn list_open_regions(&self, env_id: &EnvId) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT region_name FROM env_regions WHERE env_id = $1 AND is_active = 1 ORDER BY region_name",
        )
        .bind(env_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to list regions for {}", env_id)))
    }
}
