//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a small TOML file. Runtime settings live in
//! the `settings` table of `xrf.db` and are owned by the ingest crate.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `XRF_ROOT_FOLDER` environment variable
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "XRF_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "xrf.db";

/// Bootstrap configuration loaded from TOML
///
/// Every field is optional. A missing or unreadable file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Root folder holding `xrf.db`
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Semantic grouping provider settings
    #[serde(default)]
    pub grouping: GroupingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Grouping provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupingConfig {
    /// Chat-completions endpoint URL
    #[serde(default = "default_grouping_endpoint")]
    pub endpoint: String,

    /// Model identifier sent with each request
    #[serde(default = "default_grouping_model")]
    pub model: String,

    /// API key (lowest priority source, see the ingest config resolver)
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_grouping_endpoint(),
            model: default_grouping_model(),
            api_key: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_grouping_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_grouping_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Compiled-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
        }
    }
}

/// Load TOML configuration from an explicit path
///
/// Unlike [`TomlConfig::load_or_default`], a missing file is an error here.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Write TOML configuration, replacing the target atomically where possible
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

impl TomlConfig {
    /// Load from `path`, or from the default config location when `path` is None
    ///
    /// Missing or malformed files never stop startup: a warning is logged and
    /// defaults are returned.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };

        let Some(candidate) = candidate else {
            debug!("No config file location available, using defaults");
            return Self::default();
        };

        if !candidate.exists() {
            if path.is_some() {
                warn!(path = %candidate.display(), "Config file not found, using defaults");
            }
            return Self::default();
        }

        match load_toml_config(&candidate) {
            Ok(config) => {
                debug!(path = %candidate.display(), "Loaded TOML config");
                config
            }
            Err(e) => {
                warn!(
                    path = %candidate.display(),
                    error = %e,
                    "Invalid config file, using defaults"
                );
                Self::default()
            }
        }
    }
}

/// Default config file location (`<config_dir>/xrf/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("xrf").join("config.toml"))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("xrf"))
        .unwrap_or_else(|| PathBuf::from("./xrf_data"))
}

/// Resolves the root folder following the documented priority order
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!(path = %path.display(), "Root folder from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                debug!(path = %path, "Root folder from environment");
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            debug!(path = %path.display(), "Root folder from TOML config");
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and locates the database inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            tracing::info!(path = %self.root_folder.display(), "Created root folder");
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_toml_empty() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert!(config.root_folder.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(config.grouping.api_key.is_none());
        assert!(config.grouping.endpoint.starts_with("https://"));
    }

    #[test]
    fn test_partial_grouping_section() {
        let config: TomlConfig = toml::from_str(
            r#"
            [grouping]
            model = "local-model"
            "#,
        )
        .unwrap();
        assert_eq!(config.grouping.model, "local-model");
        assert_eq!(config.grouping.endpoint, default_grouping_endpoint());
    }

    #[test]
    fn test_database_path_inside_root() {
        let init = RootFolderInitializer::new(PathBuf::from("/tmp/xrf-root"));
        assert_eq!(init.database_path(), PathBuf::from("/tmp/xrf-root/xrf.db"));
    }
}
