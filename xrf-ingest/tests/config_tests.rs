//! Configuration resolution tests
//!
//! Tests that touch XRF_GROUPING_API_KEY are marked #[serial] so they
//! never run concurrently with each other.

use serial_test::serial;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::time::Duration;
use xrf_common::config::{GroupingConfig, LoggingConfig, TomlConfig};
use xrf_ingest::config::{
    is_valid_key, load_retry_policy, resolve_grouping_api_key, KeySource, GROUPING_API_KEY_ENV,
};
use xrf_ingest::db::settings::{set_grouping_api_key, set_setting};

async fn setup_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    xrf_ingest::db::init_tables(&pool).await.unwrap();
    pool
}

fn toml_with_key(key: Option<&str>) -> TomlConfig {
    TomlConfig {
        root_folder: None,
        logging: LoggingConfig::default(),
        grouping: GroupingConfig {
            api_key: key.map(str::to_string),
            ..GroupingConfig::default()
        },
    }
}

// ============================================================================
// API key resolution
// ============================================================================

#[tokio::test]
#[serial]
async fn test_database_overrides_env_and_toml() {
    let pool = setup_pool().await;
    set_grouping_api_key(&pool, "db-key".to_string()).await.unwrap();
    std::env::set_var(GROUPING_API_KEY_ENV, "env-key");

    let (key, source) = resolve_grouping_api_key(&pool, &toml_with_key(Some("toml-key")))
        .await
        .unwrap();
    assert_eq!(key, "db-key");
    assert_eq!(source, KeySource::Database);

    std::env::remove_var(GROUPING_API_KEY_ENV);
}

#[tokio::test]
#[serial]
async fn test_env_fallback_when_database_empty() {
    let pool = setup_pool().await;
    std::env::set_var(GROUPING_API_KEY_ENV, "env-key");

    let (key, source) = resolve_grouping_api_key(&pool, &toml_with_key(Some("toml-key")))
        .await
        .unwrap();
    assert_eq!(key, "env-key");
    assert_eq!(source, KeySource::Environment);

    std::env::remove_var(GROUPING_API_KEY_ENV);
}

#[tokio::test]
#[serial]
async fn test_toml_fallback_when_database_and_env_empty() {
    let pool = setup_pool().await;
    std::env::remove_var(GROUPING_API_KEY_ENV);

    let (key, source) = resolve_grouping_api_key(&pool, &toml_with_key(Some("toml-key")))
        .await
        .unwrap();
    assert_eq!(key, "toml-key");
    assert_eq!(source, KeySource::Toml);
}

#[tokio::test]
#[serial]
async fn test_blank_values_are_skipped() {
    let pool = setup_pool().await;
    set_grouping_api_key(&pool, "   ".to_string()).await.unwrap();
    std::env::set_var(GROUPING_API_KEY_ENV, "");

    let (key, _) = resolve_grouping_api_key(&pool, &toml_with_key(Some("toml-key")))
        .await
        .unwrap();
    assert_eq!(key, "toml-key");

    std::env::remove_var(GROUPING_API_KEY_ENV);
}

#[tokio::test]
#[serial]
async fn test_error_when_no_key_configured() {
    let pool = setup_pool().await;
    std::env::remove_var(GROUPING_API_KEY_ENV);

    let err = resolve_grouping_api_key(&pool, &toml_with_key(None))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("not configured"));
    assert!(message.contains(GROUPING_API_KEY_ENV));
}

#[test]
fn test_key_validation() {
    assert!(is_valid_key("sk-123"));
    assert!(!is_valid_key(""));
    assert!(!is_valid_key("\n "));
}

// ============================================================================
// Retry policy
// ============================================================================

#[tokio::test]
async fn test_retry_policy_defaults() {
    let pool = setup_pool().await;
    let policy = load_retry_policy(&pool).await.unwrap();

    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.backoff_base, Duration::from_secs(1));
    assert_eq!(policy.min_interval, Duration::from_secs(1));
}

#[tokio::test]
async fn test_retry_policy_from_settings() {
    let pool = setup_pool().await;
    set_setting(&pool, "grouping_min_interval_ms", 250).await.unwrap();
    set_setting(&pool, "grouping_backoff_base_ms", 50).await.unwrap();
    set_setting(&pool, "grouping_max_attempts", 2).await.unwrap();

    let policy = load_retry_policy(&pool).await.unwrap();

    assert_eq!(policy.max_attempts, 2);
    assert_eq!(policy.backoff_base, Duration::from_millis(50));
    assert_eq!(policy.min_interval, Duration::from_millis(250));
}
