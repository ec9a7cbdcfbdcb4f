//! Environment-driven configuration against a file-backed store.

use std::env;
use std::sync::Mutex;

use anyhow::Result;
use regionctl::config::AppConfig;
use regionctl::domain::RegionEndpoint;
use regionctl::storage::{create_pool, get_migration_version, RegionEndpointRegistry, SqlxRegionRepository};

// Serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const KEYS: &[&str] = &["DATABASE_URL", "DATABASE_MAX_CONNECTIONS", "REGIONCTL_LOG_LEVEL", "REGIONCTL_JSON_LOGS"];

fn clear_env() {
    for key in KEYS {
        env::remove_var(key);
    }
}

#[test]
fn test_config_environment_integration() -> Result<()> {
    let _guard = ENV_MUTEX.lock().unwrap();

    env::set_var("DATABASE_URL", "sqlite://./data/other.db");
    env::set_var("DATABASE_MAX_CONNECTIONS", "3");
    env::set_var("REGIONCTL_LOG_LEVEL", "regionctl=debug");
    env::set_var("REGIONCTL_JSON_LOGS", "TRUE");

    let config = AppConfig::from_env();
    clear_env();

    assert_eq!(config.database.url, "sqlite://./data/other.db");
    assert_eq!(config.database.max_connections, 3);
    assert_eq!(config.observability.log_level, "regionctl=debug");
    assert!(config.observability.json_logging);
    config.validate()?;
    Ok(())
}

#[test]
fn test_non_sqlite_database_is_rejected() {
    let _guard = ENV_MUTEX.lock().unwrap();

    env::set_var("DATABASE_URL", "postgresql://localhost/regionctl");
    let config = AppConfig::from_env();
    clear_env();

    assert!(config.validate().is_err());
}

#[tokio::test]
async fn test_regions_survive_reopening_the_store() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}", dir.path().join("regionctl.db").display());

    let config = {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("DATABASE_URL", &url);
        let config = AppConfig::from_env();
        clear_env();
        config
    };

    let pool = create_pool(&config.database).await?;
    let mut endpoint = RegionEndpoint::new("region-a", "https://region-a.local:8443").with_token("secret");
    endpoint.http_domain = Some("apps.region-a.local".into());
    SqlxRegionRepository::new(pool.clone()).upsert(&endpoint).await?;
    pool.close().await;

    let reopened = create_pool(&config.database).await?;
    assert!(get_migration_version(&reopened).await?.is_some());

    let resolved = SqlxRegionRepository::new(reopened).resolve("region-a").await?;
    assert_eq!(resolved, endpoint);
    Ok(())
}
