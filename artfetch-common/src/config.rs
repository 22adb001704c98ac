//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// TOML configuration file contents (`artfetch.toml`)
///
/// All fields are optional; missing values fall back to environment
/// variables or the settings table in the database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and downloaded assets
    pub root_folder: Option<String>,

    /// TMDB API key (env `ARTFETCH_TMDB_API_KEY` takes priority)
    pub tmdb_api_key: Option<String>,

    /// fanart.tv personal API key (env `ARTFETCH_FANARTTV_API_KEY` takes priority)
    pub fanarttv_api_key: Option<String>,

    /// Media library JSON-RPC endpoint, e.g. `http://127.0.0.1:8080/jsonrpc`
    pub library_endpoint: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter directive, e.g. "info" or "artfetch_svc=debug"
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Load the TOML config from a path, returning defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Write the config back to disk, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Ok(config) = TomlConfig::load(&default_config_path()) {
        if let Some(root_folder) = config.root_folder {
            return PathBuf::from(root_folder);
        }
    }

    default_root_folder()
}

/// Default configuration file path for the platform
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("artfetch")
        .join("artfetch.toml")
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("artfetch")
}

/// Ensure the root folder exists and return the database path within it.
pub fn ensure_root_folder(root: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    Ok(root.join("artfetch.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_config_returns_defaults() {
        let temp = TempDir::new().unwrap();
        let config = TomlConfig::load(&temp.path().join("nope.toml")).unwrap();
        assert!(config.root_folder.is_none());
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_config_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("artfetch.toml");

        let config = TomlConfig {
            root_folder: Some("/srv/artfetch".to_string()),
            tmdb_api_key: Some("abc123".to_string()),
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = TomlConfig::load(&path).unwrap();
        assert_eq!(loaded.root_folder.as_deref(), Some("/srv/artfetch"));
        assert_eq!(loaded.tmdb_api_key.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_cli_arg_wins_over_env() {
        std::env::set_var("ARTFETCH_TEST_ROOT", "/from/env");
        let resolved = resolve_root_folder(Some("/from/cli"), "ARTFETCH_TEST_ROOT");
        assert_eq!(resolved, PathBuf::from("/from/cli"));
        std::env::remove_var("ARTFETCH_TEST_ROOT");
    }

    #[test]
    fn test_env_used_when_no_cli() {
        std::env::set_var("ARTFETCH_TEST_ROOT2", "/from/env");
        let resolved = resolve_root_folder(None, "ARTFETCH_TEST_ROOT2");
        assert_eq!(resolved, PathBuf::from("/from/env"));
        std::env::remove_var("ARTFETCH_TEST_ROOT2");
    }
}
