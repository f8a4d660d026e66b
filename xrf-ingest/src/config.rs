//! Configuration resolution for xrf-ingest
//!
//! Provides multi-tier configuration resolution with Database → ENV → TOML priority.

use sqlx::{Pool, Sqlite};
use std::time::Duration;
use tracing::{debug, warn};
use xrf_common::config::TomlConfig;
use xrf_common::{Error, Result};

use crate::db::settings;
use crate::services::RetryPolicy;

/// Environment variable holding the grouping provider API key
pub const GROUPING_API_KEY_ENV: &str = "XRF_GROUPING_API_KEY";

/// Where a resolved API key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Database,
    Environment,
    Toml,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Database => "database",
            KeySource::Environment => "environment",
            KeySource::Toml => "TOML",
        }
    }
}

/// Resolve the grouping API key from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
///
/// # Errors
/// [`Error::Config`] when no source holds a usable key. Callers normally
/// continue without AI grouping in that case.
pub async fn resolve_grouping_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<(String, KeySource)> {
    let db_key = settings::get_grouping_api_key(db)
        .await?
        .filter(|k| is_valid_key(k));
    let env_key = std::env::var(GROUPING_API_KEY_ENV)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .grouping
        .api_key
        .clone()
        .filter(|k| is_valid_key(k));

    let candidates = [
        (db_key, KeySource::Database),
        (env_key, KeySource::Environment),
        (toml_key, KeySource::Toml),
    ];

    let sources: Vec<&str> = candidates
        .iter()
        .filter(|(key, _)| key.is_some())
        .map(|(_, source)| source.as_str())
        .collect();

    // Warn if multiple sources (potential misconfiguration)
    if sources.len() > 1 {
        warn!(
            "Grouping API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    for (key, source) in candidates {
        if let Some(key) = key {
            debug!("Grouping API key loaded from {}", source.as_str());
            return Ok((key, source));
        }
    }

    Err(Error::Config(format!(
        "Grouping API key not configured. Configure using one of:\n\
         1. CLI: xrf-ingest set-api-key <KEY>\n\
         2. Environment: {}=<KEY>\n\
         3. TOML config: [grouping] api_key = \"<KEY>\"",
        GROUPING_API_KEY_ENV
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Load the grouping retry policy from the settings table
pub async fn load_retry_policy(db: &Pool<Sqlite>) -> Result<RetryPolicy> {
    Ok(RetryPolicy {
        max_attempts: settings::get_grouping_max_attempts(db).await?,
        backoff_base: Duration::from_millis(settings::get_grouping_backoff_base_ms(db).await?),
        min_interval: Duration::from_millis(settings::get_grouping_min_interval_ms(db).await?),
    })
}
