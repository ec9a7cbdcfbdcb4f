//! TCP/UDP gateway rule persistence.

use async_trait::async_trait;
use sqlx::FromRow;
use tracing::instrument;

use super::{from_json_text, map_write_error, parse_timestamp, to_json_text};
use crate::domain::{ComponentId, EnvId, StreamProtocol, TcpRule, TcpRuleId};
use crate::errors::{Error, Result};
use crate::storage::DbPool;

// ============================================================================
// Database Row Type
// ============================================================================

#[derive(Debug, Clone, FromRow)]
struct TcpRuleRow {
    tcp_rule_id: String,
    component_id: String,
    env_id: String,
    region_name: String,
    container_port: i64,
    endpoint: String,
    protocol: String,
    rule_extensions: String,
    is_custom: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TcpRuleRow> for TcpRule {
    type Error = Error;

    fn try_from(row: TcpRuleRow) -> Result<Self> {
        let container_port = u16::try_from(row.container_port)
            .map_err(|_| Error::internal(format!("stored port out of range: {}", row.container_port)))?;

        Ok(TcpRule {
            tcp_rule_id: TcpRuleId::from_string(row.tcp_rule_id),
            component_id: ComponentId::from_string(row.component_id),
            env_id: EnvId::from_string(row.env_id),
            region_name: row.region_name,
            container_port,
            endpoint: row.endpoint,
            protocol: StreamProtocol::from_declared(Some(&row.protocol)),
            rule_extensions: from_json_text(&row.rule_extensions, "Failed to decode rule extensions")?,
            is_custom: row.is_custom,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait TcpRuleRepository: Send + Sync {
    async fn insert(&self, rule: &TcpRule) -> Result<()>;

    async fn get(&self, tcp_rule_id: &TcpRuleId) -> Result<Option<TcpRule>>;

    async fn get_by_endpoint(&self, region_name: &str, endpoint: &str) -> Result<Option<TcpRule>>;

    /// Swap `previous` for `replacement` in one transaction.
    async fn replace(&self, previous: &TcpRuleId, replacement: &TcpRule) -> Result<()>;

    async fn delete(&self, tcp_rule_id: &TcpRuleId) -> Result<bool>;

    async fn list_by_component_port(
        &self,
        component_id: &ComponentId,
        container_port: u16,
    ) -> Result<Vec<TcpRule>>;

    async fn delete_by_component_port(
        &self,
        component_id: &ComponentId,
        container_port: u16,
    ) -> Result<u64>;
}

// ============================================================================
// SQLx Implementation
// ============================================================================

#[derive(Debug, Clone)]
pub struct SqlxTcpRuleRepository {
    pool: DbPool,
}

impl SqlxTcpRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const INSERT_TCP_RULE: &str = r#"
    INSERT INTO gateway_tcp_rules (
        tcp_rule_id, component_id, env_id, region_name, container_port, endpoint,
        protocol, rule_extensions, is_custom, created_at, updated_at
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
"#;

fn insert_query(rule: &TcpRule, extensions: String) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(INSERT_TCP_RULE)
        .bind(&rule.tcp_rule_id)
        .bind(&rule.component_id)
        .bind(&rule.env_id)
        .bind(&rule.region_name)
        .bind(i64::from(rule.container_port))
        .bind(&rule.endpoint)
        .bind(rule.protocol.as_str())
        .bind(extensions)
        .bind(rule.is_custom)
        .bind(rule.created_at.to_rfc3339())
        .bind(rule.updated_at.to_rfc3339())
}

#[async_trait]
impl TcpRuleRepository for SqlxTcpRuleRepository {
    #[instrument(skip(self, rule), fields(endpoint = %rule.endpoint), name = "db_insert_tcp_rule")]
    async fn insert(&self, rule: &TcpRule) -> Result<()> {
        let extensions = to_json_text(&rule.rule_extensions, "Failed to encode rule extensions")?;
        insert_query(rule, extensions).execute(&self.pool).await.map_err(|e| {
            map_write_error(e, &rule.endpoint, format!("Failed to insert tcp rule: {}", rule.tcp_rule_id))
        })?;
        Ok(())
    }

    #[instrument(skip(self), fields(tcp_rule_id = %tcp_rule_id), name = "db_get_tcp_rule")]
    async fn get(&self, tcp_rule_id: &TcpRuleId) -> Result<Option<TcpRule>> {
        let row = sqlx::query_as::<_, TcpRuleRow>(
            "SELECT * FROM gateway_tcp_rules WHERE tcp_rule_id = $1",
        )
        .bind(tcp_rule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to get tcp rule: {}", tcp_rule_id)))?;

        row.map(TcpRule::try_from).transpose()
    }

    #[instrument(skip(self), name = "db_get_tcp_rule_by_endpoint")]
    async fn get_by_endpoint(&self, region_name: &str, endpoint: &str) -> Result<Option<TcpRule>> {
        let row = sqlx::query_as::<_, TcpRuleRow>(
            "SELECT * FROM gateway_tcp_rules WHERE region_name = $1 AND endpoint = $2",
        )
        .bind(region_name)
        .bind(endpoint)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to look up tcp endpoint: {}", endpoint)))?;

        row.map(TcpRule::try_from).transpose()
    }

    #[instrument(skip(self, replacement), fields(previous = %previous, replacement = %replacement.tcp_rule_id), name = "db_replace_tcp_rule")]
    async fn replace(&self, previous: &TcpRuleId, replacement: &TcpRule) -> Result<()> {
        let extensions = to_json_text(&replacement.rule_extensions, "Failed to encode rule extensions")?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::database(e, "Failed to begin tcp rule transaction"))?;

        sqlx::query("DELETE FROM gateway_tcp_rules WHERE tcp_rule_id = $1")
            .bind(previous)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::database(e, format!("Failed to remove tcp rule: {}", previous)))?;

        insert_query(replacement, extensions).execute(&mut *tx).await.map_err(|e| {
            map_write_error(
                e,
                &replacement.endpoint,
                format!("Failed to insert tcp rule: {}", replacement.tcp_rule_id),
            )
        })?;

        tx.commit().await.map_err(|e| Error::database(e, "Failed to commit tcp rule replacement"))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tcp_rule_id = %tcp_rule_id), name = "db_delete_tcp_rule")]
    async fn delete(&self, tcp_rule_id: &TcpRuleId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM gateway_tcp_rules WHERE tcp_rule_id = $1")
            .bind(tcp_rule_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::database(e, format!("Failed to delete tcp rule: {}", tcp_rule_id)))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(component_id = %component_id, port = container_port), name = "db_list_tcp_rules_by_port")]
    async fn list_by_component_port(
        &self,
        component_id: &ComponentId,
        container_port: u16,
    ) -> Result<Vec<TcpRule>> {
        let rows = sqlx::query_as::<_, TcpRuleRow>(
            r#"
            SELECT * FROM gateway_tcp_rules
            WHERE component_id = $1 AND container_port = $2
            ORDER BY created_at ASC, tcp_rule_id ASC
            "#,
        )
        .bind(component_id)
        .bind(i64::from(container_port))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to list tcp rules for {}", component_id)))?;

        rows.into_iter().map(TcpRule::try_from).collect()
    }

    #[instrument(skip(self), fields(component_id = %component_id, port = container_port), name = "db_delete_tcp_rules_by_port")]
    async fn delete_by_component_port(
        &self,
        component_id: &ComponentId,
        container_port: u16,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM gateway_tcp_rules WHERE component_id = $1 AND container_port = $2",
        )
        .bind(component_id)
        .bind(i64::from(container_port))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to delete tcp rules for {}", component_id)))?;

        Ok(result.rows_affected())
    }
}
