//! Settings table access: provider API keys and tunables.

use artfetch_common::Result;
use sqlx::SqlitePool;

pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(value)
}

pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn get_tmdb_api_key(pool: &SqlitePool) -> Result<Option<String>> {
    get_setting(pool, "tmdb_api_key").await
}

pub async fn set_tmdb_api_key(pool: &SqlitePool, key: &str) -> Result<()> {
    set_setting(pool, "tmdb_api_key", key).await
}

pub async fn get_fanarttv_api_key(pool: &SqlitePool) -> Result<Option<String>> {
    get_setting(pool, "fanarttv_api_key").await
}

pub async fn set_fanarttv_api_key(pool: &SqlitePool, key: &str) -> Result<()> {
    set_setting(pool, "fanarttv_api_key", key).await
}

/// Preferred artwork language (ISO 639-1), defaulting to "en".
pub async fn preferred_language(pool: &SqlitePool) -> Result<String> {
    Ok(get_setting(pool, "preferred_language")
        .await?
        .unwrap_or_else(|| "en".to_string()))
}

/// Whether fanart slots should honor the language preference instead of
/// defaulting to text-free art.
pub async fn prefer_fanart_language(pool: &SqlitePool) -> Result<bool> {
    Ok(get_setting(pool, "prefer_fanart_language")
        .await?
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false))
}
