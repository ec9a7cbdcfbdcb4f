//! HTTP gateway rule persistence.

use async_trait::async_trait;
use sqlx::FromRow;
use tracing::instrument;

use super::{from_json_text, map_write_error, parse_timestamp, to_json_text};
use crate::domain::{
    CertificateId, ComponentId, EnvId, HttpProtocol, HttpRule, HttpRuleId,
};
use crate::errors::{Error, Result};
use crate::storage::DbPool;

// ============================================================================
// Database Row Type
// ============================================================================

#[derive(Debug, Clone, FromRow)]
struct HttpRuleRow {
    rule_id: String,
    component_id: String,
    env_id: String,
    region_name: String,
    container_port: i64,
    domain_name: String,
    protocol: String,
    certificate_id: Option<String>,
    path: String,
    cookie_match: Option<String>,
    header_match: Option<String>,
    weight: i64,
    path_rewrite: bool,
    rewrites: String,
    rule_extensions: String,
    is_custom: bool,
    is_senior: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<HttpRuleRow> for HttpRule {
    type Error = Error;

    fn try_from(row: HttpRuleRow) -> Result<Self> {
        let protocol: HttpProtocol = row.protocol.parse()?;
        let container_port = u16::try_from(row.container_port)
            .map_err(|_| Error::internal(format!("stored port out of range: {}", row.container_port)))?;
        let weight = u8::try_from(row.weight)
            .map_err(|_| Error::internal(format!("stored weight out of range: {}", row.weight)))?;

        Ok(HttpRule {
            rule_id: HttpRuleId::from_string(row.rule_id),
            component_id: ComponentId::from_string(row.component_id),
            env_id: EnvId::from_string(row.env_id),
            region_name: row.region_name,
            container_port,
            domain_name: row.domain_name,
            protocol,
            certificate_id: row.certificate_id.filter(|c| !c.is_empty()).map(CertificateId::from_string),
            path: row.path,
            cookie_match: row.cookie_match,
            header_match: row.header_match,
            weight,
            path_rewrite: row.path_rewrite,
            rewrites: from_json_text(&row.rewrites, "Failed to decode rule rewrites")?,
            rule_extensions: from_json_text(&row.rule_extensions, "Failed to decode rule extensions")?,
            is_custom: row.is_custom,
            is_senior: row.is_senior,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait HttpRuleRepository: Send + Sync {
    /// Insert rules atomically: either every row is stored or none is.
    async fn insert_all(&self, rules: &[HttpRule]) -> Result<()>;

    async fn get(&self, rule_id: &HttpRuleId) -> Result<Option<HttpRule>>;

    /// Overwrite an existing rule in place, keeping its id.
    async fn update(&self, rule: &HttpRule) -> Result<()>;

    /// Returns false when no row matched.
    async fn delete(&self, rule_id: &HttpRuleId) -> Result<bool>;

    /// First rule claiming the same component port, domain, protocol and path,
    /// ignoring `exclude`.
    async fn find_conflict(
        &self,
        rule: &HttpRule,
        exclude: Option<&HttpRuleId>,
    ) -> Result<Option<HttpRule>>;

    async fn list_by_component_port(
        &self,
        component_id: &ComponentId,
        container_port: u16,
    ) -> Result<Vec<HttpRule>>;

    async fn list_by_certificate(&self, certificate_id: &CertificateId) -> Result<Vec<HttpRule>>;

    /// Returns the number of rows removed.
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
pub struct SqlxHttpRuleRepository {
    pool: DbPool,
}

impl SqlxHttpRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const INSERT_HTTP_RULE: &str = r#"
    INSERT INTO gateway_http_rules (
        rule_id, component_id, env_id, region_name, container_port, domain_name,
        protocol, certificate_id, path, cookie_match, header_match, weight,
        path_rewrite, rewrites, rule_extensions, is_custom, is_senior,
        created_at, updated_at
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
"#;

#[async_trait]
impl HttpRuleRepository for SqlxHttpRuleRepository {
    #[instrument(skip(self, rules), fields(count = rules.len()), name = "db_insert_http_rules")]
    async fn insert_all(&self, rules: &[HttpRule]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::database(e, "Failed to begin http rule transaction"))?;

        for rule in rules {
            sqlx::query(INSERT_HTTP_RULE)
                .bind(&rule.rule_id)
                .bind(&rule.component_id)
                .bind(&rule.env_id)
                .bind(&rule.region_name)
                .bind(i64::from(rule.container_port))
                .bind(&rule.domain_name)
                .bind(rule.protocol.as_str())
                .bind(rule.certificate_id.as_ref())
                .bind(&rule.path)
                .bind(rule.cookie_match.as_deref())
                .bind(rule.header_match.as_deref())
                .bind(i64::from(rule.weight))
                .bind(rule.path_rewrite)
                .bind(to_json_text(&rule.rewrites, "Failed to encode rule rewrites")?)
                .bind(to_json_text(&rule.rule_extensions, "Failed to encode rule extensions")?)
                .bind(rule.is_custom)
                .bind(rule.is_senior)
                .bind(rule.created_at.to_rfc3339())
                .bind(rule.updated_at.to_rfc3339())
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    map_write_error(
                        e,
                        &rule.domain_name,
                        format!("Failed to insert http rule: {}", rule.rule_id),
                    )
                })?;
        }

        tx.commit().await.map_err(|e| Error::database(e, "Failed to commit http rules"))?;
        Ok(())
    }

    #[instrument(skip(self), fields(rule_id = %rule_id), name = "db_get_http_rule")]
    async fn get(&self, rule_id: &HttpRuleId) -> Result<Option<HttpRule>> {
        let row = sqlx::query_as::<_, HttpRuleRow>(
            "SELECT * FROM gateway_http_rules WHERE rule_id = $1",
        )
        .bind(rule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to get http rule: {}", rule_id)))?;

        row.map(HttpRule::try_from).transpose()
    }

    #[instrument(skip(self, rule), fields(rule_id = %rule.rule_id), name = "db_update_http_rule")]
    async fn update(&self, rule: &HttpRule) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE gateway_http_rules SET
                container_port = $2, domain_name = $3, protocol = $4, certificate_id = $5,
                path = $6, cookie_match = $7, header_match = $8, weight = $9,
                path_rewrite = $10, rewrites = $11, rule_extensions = $12,
                is_custom = $13, is_senior = $14, updated_at = $15
            WHERE rule_id = $1
            "#,
        )
        .bind(&rule.rule_id)
        .bind(i64::from(rule.container_port))
        .bind(&rule.domain_name)
        .bind(rule.protocol.as_str())
        .bind(rule.certificate_id.as_ref())
        .bind(&rule.path)
        .bind(rule.cookie_match.as_deref())
        .bind(rule.header_match.as_deref())
        .bind(i64::from(rule.weight))
        .bind(rule.path_rewrite)
        .bind(to_json_text(&rule.rewrites, "Failed to encode rule rewrites")?)
        .bind(to_json_text(&rule.rule_extensions, "Failed to encode rule extensions")?)
        .bind(rule.is_custom)
        .bind(rule.is_senior)
        .bind(rule.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_write_error(e, &rule.domain_name, format!("Failed to update http rule: {}", rule.rule_id))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("http rule", rule.rule_id.as_str()));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(rule_id = %rule_id), name = "db_delete_http_rule")]
    async fn delete(&self, rule_id: &HttpRuleId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM gateway_http_rules WHERE rule_id = $1")
            .bind(rule_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::database(e, format!("Failed to delete http rule: {}", rule_id)))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, rule, exclude), fields(domain = %rule.domain_name), name = "db_find_http_rule_conflict")]
    async fn find_conflict(
        &self,
        rule: &HttpRule,
        exclude: Option<&HttpRuleId>,
    ) -> Result<Option<HttpRule>> {
        let row = sqlx::query_as::<_, HttpRuleRow>(
            r#"
            SELECT * FROM gateway_http_rules
            WHERE component_id = $1 AND container_port = $2 AND domain_name = $3
              AND protocol = $4 AND path = $5 AND ($6 IS NULL OR rule_id != $6)
            LIMIT 1
            "#,
        )
        .bind(&rule.component_id)
        .bind(i64::from(rule.container_port))
        .bind(&rule.domain_name)
        .bind(rule.protocol.as_str())
        .bind(&rule.path)
        .bind(exclude)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::database(e, "Failed to check http rule uniqueness"))?;

        row.map(HttpRule::try_from).transpose()
    }

    #[instrument(skip(self), fields(component_id = %component_id, port = container_port), name = "db_list_http_rules_by_port")]
    async fn list_by_component_port(
        &self,
        component_id: &ComponentId,
        container_port: u16,
    ) -> Result<Vec<HttpRule>> {
        let rows = sqlx::query_as::<_, HttpRuleRow>(
            r#"
            SELECT * FROM gateway_http_rules
            WHERE component_id = $1 AND container_port = $2
            ORDER BY created_at ASC, rule_id ASC
            "#,
        )
        .bind(component_id)
        .bind(i64::from(container_port))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to list http rules for {}", component_id)))?;

        rows.into_iter().map(HttpRule::try_from).collect()
    }

    #[instrument(skip(self), fields(certificate_id = %certificate_id), name = "db_list_http_rules_by_certificate")]
    async fn list_by_certificate(&self, certificate_id: &CertificateId) -> Result<Vec<HttpRule>> {
        let rows = sqlx::query_as::<_, HttpRuleRow>(
            "SELECT * FROM gateway_http_rules WHERE certificate_id = $1 ORDER BY rule_id ASC",
        )
        .bind(certificate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::database(e, format!("Failed to list http rules for certificate {}", certificate_id))
        })?;

        rows.into_iter().map(HttpRule::try_from).collect()
    }

    #[instrument(skip(self), fields(component_id = %component_id, port = container_port), name = "db_delete_http_rules_by_port")]
    async fn delete_by_component_port(
        &self,
        component_id: &ComponentId,
        container_port: u16,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM gateway_http_rules WHERE component_id = $1 AND container_port = $2",
        )
        .bind(component_id)
        .bind(i64::from(container_port))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to delete http rules for {}", component_id)))?;

        Ok(result.rows_affected())
    }
}
