//! # Database Migration Management
//!
//! Schema migrations are embedded in the binary and applied in version order.
//! Applied versions are recorded in `_regionctl_migrations`.

use crate::errors::{Error, Result};
use crate::storage::DbPool;
use sqlx::Row;
use tracing::{error, info};

/// Embedded migrations: (version, description, sql)
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (
        20240101000001,
        "create_region_tables",
        r#"
        CREATE TABLE IF NOT EXISTS region_configs (
            region_name TEXT PRIMARY KEY,
            base_url TEXT NOT NULL,
            token TEXT NOT NULL DEFAULT '',
            verify_tls INTEGER NOT NULL DEFAULT 1,
            ca_cert TEXT,
            client_cert TEXT,
            client_key TEXT,
            http_domain TEXT,
            tcp_domain TEXT,
            status TEXT NOT NULL DEFAULT 'online',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS env_regions (
            env_id TEXT NOT NULL,
            region_name TEXT NOT NULL,
            region_tenant_env_id TEXT NOT NULL DEFAULT '',
            is_active INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (env_id, region_name)
        );

        CREATE TABLE IF NOT EXISTS component_ports (
            component_id TEXT NOT NULL,
            container_port INTEGER NOT NULL,
            protocol TEXT NOT NULL DEFAULT 'tcp',
            PRIMARY KEY (component_id, container_port)
        );
        "#,
    ),
    (
        20240101000002,
        "create_gateway_tables",
        r#"
        CREATE TABLE IF NOT EXISTS gateway_certificates (
            certificate_id TEXT PRIMARY KEY,
            env_id TEXT NOT NULL,
            alias TEXT NOT NULL,
            certificate TEXT NOT NULL,
            private_key TEXT NOT NULL,
            certificate_type TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (env_id, alias)
        );

        CREATE TABLE IF NOT EXISTS gateway_http_rules (
            rule_id TEXT PRIMARY KEY,
            component_id TEXT NOT NULL,
            env_id TEXT NOT NULL,
            region_name TEXT NOT NULL,
            container_port INTEGER NOT NULL,
            domain_name TEXT NOT NULL,
            protocol TEXT NOT NULL,
            certificate_id TEXT,
            path TEXT NOT NULL DEFAULT '/',
            cookie_match TEXT,
            header_match TEXT,
            weight INTEGER NOT NULL DEFAULT 100,
            path_rewrite INTEGER NOT NULL DEFAULT 0,
            rewrites TEXT NOT NULL DEFAULT '[]',
            rule_extensions TEXT NOT NULL DEFAULT '[]',
            is_custom INTEGER NOT NULL DEFAULT 1,
            is_senior INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (component_id, container_port, domain_name, protocol, path)
        );

        CREATE INDEX IF NOT EXISTS idx_http_rules_certificate
            ON gateway_http_rules (certificate_id);
        CREATE INDEX IF NOT EXISTS idx_http_rules_component_port
            ON gateway_http_rules (component_id, container_port);

        CREATE TABLE IF NOT EXISTS gateway_tcp_rules (
            tcp_rule_id TEXT PRIMARY KEY,
            component_id TEXT NOT NULL,
            env_id TEXT NOT NULL,
            region_name TEXT NOT NULL,
            container_port INTEGER NOT NULL,
            endpoint TEXT NOT NULL,
            protocol TEXT NOT NULL DEFAULT 'tcp',
            rule_extensions TEXT NOT NULL DEFAULT '[]',
            is_custom INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (region_name, endpoint)
        );

        CREATE INDEX IF NOT EXISTS idx_tcp_rules_component_port
            ON gateway_tcp_rules (component_id, container_port);
        "#,
    ),
    (
        20240101000003,
        "create_rule_config_table",
        r#"
        CREATE TABLE IF NOT EXISTS gateway_rule_configs (
            rule_id TEXT PRIMARY KEY,
            rule_kind TEXT NOT NULL,
            config TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    ),
];

/// Run all pending database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    create_migration_table(pool).await?;

    let applied = get_applied_migration_versions(pool).await?;

    let mut migrations_run = 0;
    for (version, description, sql) in MIGRATIONS {
        if applied.contains(version) {
            continue;
        }

        info!(version = version, "Running migration: {}", description);
        let start_time = std::time::Instant::now();

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| Error::database(e, "Failed to start migration transaction"))?;

        sqlx::raw_sql(sql).execute(&mut *tx).await.map_err(|e| {
            error!(error = %e, migration = description, "Migration failed");
            Error::database(e, format!("Migration failed: {}", description))
        })?;

        let execution_time = start_time.elapsed().as_millis() as i64;
        sqlx::query(
            "INSERT INTO _regionctl_migrations (version, description, execution_time, installed_on) VALUES ($1, $2, $3, $4)",
        )
        .bind(version)
        .bind(description)
        .bind(execution_time)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::database(e, format!("Failed to record migration: {}", description)))?;

        tx.commit()
            .await
            .map_err(|e| Error::database(e, "Failed to commit migration transaction"))?;

        migrations_run += 1;
        info!(version = version, execution_time_ms = execution_time, "Migration completed: {}", description);
    }

    if migrations_run > 0 {
        info!(count = migrations_run, "Database migrations completed");
    }

    Ok(())
}

async fn create_migration_table(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _regionctl_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            execution_time INTEGER NOT NULL,
            installed_on TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::database(e, "Failed to create migration tracking table"))?;

    Ok(())
}

async fn get_applied_migration_versions(pool: &DbPool) -> Result<Vec<i64>> {
    let rows = sqlx::query("SELECT version FROM _regionctl_migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .map_err(|e| Error::database(e, "Failed to get applied migrations"))?;

    Ok(rows.into_iter().map(|row| row.get::<i64, _>("version")).collect())
}

/// Latest applied migration version, if any
pub async fn get_migration_version(pool: &DbPool) -> Result<Option<i64>> {
    Ok(get_applied_migration_versions(pool).await?.into_iter().max())
}
