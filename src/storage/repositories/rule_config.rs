//! Proxy parameters recorded per gateway rule.

use async_trait::async_trait;
use chrono::Utc;
use tracing::instrument;

use super::{from_json_text, to_json_text};
use crate::domain::{RuleConfig, RuleTarget};
use crate::errors::{Error, Result};
use crate::storage::DbPool;

#[async_trait]
pub trait RuleConfigRepository: Send + Sync {
    async fn get(&self, rule_id: &str) -> Result<Option<RuleConfig>>;

    /// Insert or overwrite the configuration of a rule.
    async fn upsert(&self, target: &RuleTarget, config: &RuleConfig) -> Result<()>;

    /// Drop the configurations of the given rules, returning how many existed.
    async fn delete_many(&self, rule_ids: &[String]) -> Result<u64>;
}

#[derive(Debug, Clone)]
pub struct SqlxRuleConfigRepository {
    pool: DbPool,
}

impl SqlxRuleConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleConfigRepository for SqlxRuleConfigRepository {
    #[instrument(skip(self), name = "db_get_rule_config")]
    async fn get(&self, rule_id: &str) -> Result<Option<RuleConfig>> {
        let text = sqlx::query_scalar::<_, String>("SELECT config FROM gateway_rule_configs WHERE rule_id = $1")
            .bind(rule_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::database(e, format!("Failed to get rule config: {}", rule_id)))?;

        text.map(|text| from_json_text(&text, "Failed to decode rule config")).transpose()
    }

    #[instrument(skip(self, target, config), fields(rule_id = %target.rule_id(), kind = target.kind()), name = "db_upsert_rule_config")]
    async fn upsert(&self, target: &RuleTarget, config: &RuleConfig) -> Result<()> {
        let value = to_json_text(config, "Failed to encode rule config")?;
        sqlx::query(
            r#"
            INSERT INTO gateway_rule_configs (rule_id, rule_kind, config, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (rule_id) DO UPDATE SET
                rule_kind = excluded.rule_kind,
                config = excluded.config,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(target.rule_id())
        .bind(target.kind())
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to store rule config: {}", target.rule_id())))?;

        Ok(())
    }

    #[instrument(skip(self, rule_ids), fields(count = rule_ids.len()), name = "db_delete_rule_configs")]
    async fn delete_many(&self, rule_ids: &[String]) -> Result<u64> {
        if rule_ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::database(e, "Failed to start rule config transaction"))?;

        let mut removed = 0;
        for rule_id in rule_ids {
            let result = sqlx::query("DELETE FROM gateway_rule_configs WHERE rule_id = $1")
                .bind(rule_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::database(e, format!("Failed to delete rule config: {}", rule_id)))?;
            removed += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| Error::database(e, "Failed to commit rule config deletion"))?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HeaderSetting, HttpRuleId, TcpRuleId};
    use crate::storage::repositories::test_support::setup_test_db;
    use serde_json::json;

    fn config(header: &str) -> RuleConfig {
        let mut config = RuleConfig { set_headers: vec![HeaderSetting::new(header, "1")], ..Default::default() };
        config.parameters.insert("proxy_read_timeout".into(), json!(90));
        config
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let repo = SqlxRuleConfigRepository::new(setup_test_db().await);
        let target = RuleTarget::Http(HttpRuleId::from("rule-1"));
        assert!(repo.get("rule-1").await.unwrap().is_none());

        repo.upsert(&target, &config("x-first")).await.unwrap();
        repo.upsert(&target, &config("x-second")).await.unwrap();

        let stored = repo.get("rule-1").await.unwrap().unwrap();
        assert_eq!(stored, config("x-second"));
    }

    #[tokio::test]
    async fn test_delete_many() {
        let repo = SqlxRuleConfigRepository::new(setup_test_db().await);
        repo.upsert(&RuleTarget::Http(HttpRuleId::from("h1")), &config("x-a")).await.unwrap();
        repo.upsert(&RuleTarget::Tcp(TcpRuleId::from("t1")), &config("x-b")).await.unwrap();

        let removed = repo.delete_many(&["h1".to_string(), "missing".to_string()]).await.unwrap();
        assert_eq!(removed, 1);
        assert!(repo.get("h1").await.unwrap().is_none());
        assert!(repo.get("t1").await.unwrap().is_some());
        assert_eq!(repo.delete_many(&[]).await.unwrap(), 0);
    }
}
