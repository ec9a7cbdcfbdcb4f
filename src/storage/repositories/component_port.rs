//! Ports declared by components, used to pick a stream protocol for TCP rules.

use async_trait::async_trait;
use tracing::instrument;

use crate::domain::ComponentId;
use crate::errors::{Error, Result};
use crate::storage::DbPool;

#[async_trait]
pub trait ComponentPortRepository: Send + Sync {
    /// Declared protocol of a component port, if the port is known.
    async fn port_protocol(
        &self,
        component_id: &ComponentId,
        container_port: u16,
    ) -> Result<Option<String>>;
}

#[derive(Debug, Clone)]
pub struct SqlxComponentPortRepository {
    pool: DbPool,
}

impl SqlxComponentPortRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self), fields(component_id = %component_id, port = container_port), name = "db_upsert_component_port")]
    pub async fn upsert_port(
        &self,
        component_id: &ComponentId,
        container_port: u16,
        protocol: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO component_ports (component_id, container_port, protocol)
            VALUES ($1, $2, $3)
            ON CONFLICT (component_id, container_port) DO UPDATE SET protocol = excluded.protocol
            "#,
        )
        .bind(component_id)
        .bind(i64::from(container_port))
        .bind(protocol)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to record port {} for {}", container_port, component_id)))?;

        Ok(())
    }
}

#[async_trait]
impl ComponentPortRepository for SqlxComponentPortRepository {
    #[instrument(skip(self), fields(component_id = %component_id, port = container_port), name = "db_get_port_protocol")]
    async fn port_protocol(
        &self,
        component_id: &ComponentId,
        container_port: u16,
    ) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT protocol FROM component_ports WHERE component_id = $1 AND container_port = $2",
        )
        .bind(component_id)
        .bind(i64::from(container_port))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to get port {} for {}", container_port, component_id)))
    }
}
