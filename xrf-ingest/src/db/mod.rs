//! Database access for xrf-ingest
//!
//! A single SQLite file (`xrf.db`) holds runtime settings and the persisted
//! name normalizations.

pub mod normalization_cache;
pub mod settings;

use sqlx::SqlitePool;
use std::path::Path;
use xrf_common::Result;

/// Initialize database connection pool
///
/// Creates the parent folder and the tables used by this crate.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the settings and name_normalizations tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS name_normalizations (
            domain TEXT NOT NULL,
            original_name TEXT NOT NULL,
            canonical_name TEXT NOT NULL,
            confidence REAL NOT NULL,
            source TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (domain, original_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (settings, name_normalizations)");

    Ok(())
}
