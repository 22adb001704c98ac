//! Service configuration and provider API key resolution.
//!
//! Keys resolve env > TOML config > settings table; a key found higher up
//! the ladder is migrated into the settings table so it survives config
//! file loss.

use artfetch_common::config::TomlConfig;
use artfetch_common::Result;
use sqlx::SqlitePool;

use crate::db::settings;

pub const TMDB_KEY_ENV: &str = "ARTFETCH_TMDB_API_KEY";
pub const FANARTTV_KEY_ENV: &str = "ARTFETCH_FANARTTV_API_KEY";
pub const ROOT_ENV: &str = "ARTFETCH_ROOT";

pub const DEFAULT_BIND: &str = "127.0.0.1:5841";
pub const DEFAULT_LIBRARY_ENDPOINT: &str = "http://127.0.0.1:8080/jsonrpc";

/// Key found higher up the resolution ladder, if any.
fn ladder_key(env_var: &str, toml_value: Option<&str>) -> Option<String> {
    if let Ok(key) = std::env::var(env_var) {
        if !key.trim().is_empty() {
            tracing::info!("{} resolved from environment", env_var);
            return Some(key.trim().to_string());
        }
    }
    toml_value
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}

/// Resolve the TMDB API key. None disables the TMDB provider.
pub async fn resolve_tmdb_api_key(pool: &SqlitePool, config: &TomlConfig) -> Result<Option<String>> {
    if let Some(key) = ladder_key(TMDB_KEY_ENV, config.tmdb_api_key.as_deref()) {
        settings::set_tmdb_api_key(pool, &key).await?;
        return Ok(Some(key));
    }
    settings::get_tmdb_api_key(pool).await
}

/// Resolve the fanart.tv API key. None means public (reduced) access.
pub async fn resolve_fanarttv_api_key(
    pool: &SqlitePool,
    config: &TomlConfig,
) -> Result<Option<String>> {
    if let Some(key) = ladder_key(FANARTTV_KEY_ENV, config.fanarttv_api_key.as_deref()) {
        settings::set_fanarttv_api_key(pool, &key).await?;
        return Ok(Some(key));
    }
    settings::get_fanarttv_api_key(pool).await
}
