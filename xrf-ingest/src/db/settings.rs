//! Settings database operations
//!
//! Key-value accessors for the `settings` table. Missing values fall back to
//! built-in defaults.

use sqlx::{Pool, Sqlite};
use xrf_common::{Error, Result};

/// Default minimum spacing between grouping requests
pub const DEFAULT_GROUPING_MIN_INTERVAL_MS: u64 = 1000;

/// Default total attempts for a rate-limited grouping request
pub const DEFAULT_GROUPING_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff
pub const DEFAULT_GROUPING_BACKOFF_BASE_MS: u64 = 1000;

/// Get grouping provider API key from database
///
/// **Returns:** Some(key) if exists, None if not set
pub async fn get_grouping_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, "grouping_api_key").await
}

/// Set grouping provider API key in database
pub async fn set_grouping_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, "grouping_api_key", key).await
}

/// Minimum interval between grouping requests
///
/// **Default:** 1000 ms
pub async fn get_grouping_min_interval_ms(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting(db, "grouping_min_interval_ms")
        .await
        .map(|opt| opt.unwrap_or(DEFAULT_GROUPING_MIN_INTERVAL_MS))
}

/// Total attempts for a rate-limited grouping request
///
/// **Default:** 3. Stored values are clamped to 1..=3.
pub async fn get_grouping_max_attempts(db: &Pool<Sqlite>) -> Result<u32> {
    get_setting::<u32>(db, "grouping_max_attempts")
        .await
        .map(|opt| {
            opt.unwrap_or(DEFAULT_GROUPING_MAX_ATTEMPTS)
                .clamp(1, DEFAULT_GROUPING_MAX_ATTEMPTS)
        })
}

/// Base delay for grouping backoff
///
/// **Default:** 1000 ms
pub async fn get_grouping_backoff_base_ms(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting(db, "grouping_backoff_base_ms")
        .await
        .map(|opt| opt.unwrap_or(DEFAULT_GROUPING_BACKOFF_BASE_MS))
}

/// Generic setting getter (internal)
async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (upsert)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_api_key_not_set() {
        let pool = setup_test_db().await;
        assert_eq!(get_grouping_api_key(&pool).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_api_key_upsert() {
        let pool = setup_test_db().await;

        set_grouping_api_key(&pool, "old_key".to_string()).await.unwrap();
        set_grouping_api_key(&pool, "new_key".to_string()).await.unwrap();

        assert_eq!(
            get_grouping_api_key(&pool).await.unwrap(),
            Some("new_key".to_string())
        );

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = 'grouping_api_key'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1, "Should have exactly one entry after update");
    }

    #[tokio::test]
    async fn test_retry_defaults() {
        let pool = setup_test_db().await;

        assert_eq!(get_grouping_min_interval_ms(&pool).await.unwrap(), 1000);
        assert_eq!(get_grouping_max_attempts(&pool).await.unwrap(), 3);
        assert_eq!(get_grouping_backoff_base_ms(&pool).await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn test_max_attempts_clamped() {
        let pool = setup_test_db().await;

        set_setting(&pool, "grouping_max_attempts", 10).await.unwrap();
        assert_eq!(get_grouping_max_attempts(&pool).await.unwrap(), 3);

        set_setting(&pool, "grouping_max_attempts", 0).await.unwrap();
        assert_eq!(get_grouping_max_attempts(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_setting_is_config_error() {
        let pool = setup_test_db().await;

        set_setting(&pool, "grouping_min_interval_ms", "soon").await.unwrap();
        let err = get_grouping_min_interval_ms(&pool).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
