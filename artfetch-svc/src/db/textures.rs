//! Texture dimension cache and the persistent pre-cache work queue.
//!
//! Upgrade detection needs true pixel dimensions for artwork already set in
//! the library. Measured dimensions are stored here; URLs that still need
//! measuring sit in `precache_queue` so the caching pass can be cancelled
//! and resumed later without re-running discovery.

use artfetch_common::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

/// Look up cached dimensions for a texture URL.
pub async fn texture_dimensions(pool: &SqlitePool, url: &str) -> Result<Option<(u32, u32)>> {
    let row = sqlx::query("SELECT width, height FROM texture_cache WHERE url = ?")
        .bind(url)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| {
        let width: i64 = row.get("width");
        let height: i64 = row.get("height");
        (width as u32, height as u32)
    }))
}

/// Record measured dimensions for a texture URL.
pub async fn put_texture(pool: &SqlitePool, url: &str, width: u32, height: u32) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO texture_cache (url, width, height, cached_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(url)
    .bind(width as i64)
    .bind(height as i64)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Queue URLs for the bulk caching pass. Already-measured and already-queued
/// URLs are skipped. Returns the number newly queued.
pub async fn enqueue_precache(pool: &SqlitePool, urls: &[String]) -> Result<u64> {
    if urls.is_empty() {
        return Ok(0);
    }

    let now = Utc::now().to_rfc3339();
    let mut queued = 0;
    let mut tx = pool.begin().await?;

    for url in urls {
        let already_measured: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM texture_cache WHERE url = ?")
                .bind(url)
                .fetch_optional(&mut *tx)
                .await?;
        if already_measured.is_some() {
            continue;
        }

        let result = sqlx::query(
            "INSERT OR IGNORE INTO precache_queue (url, status, queued_at) VALUES (?, 'pending', ?)",
        )
        .bind(url)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        queued += result.rows_affected();
    }

    tx.commit().await?;
    Ok(queued)
}

/// Next batch of pending pre-cache URLs.
pub async fn next_precache_batch(pool: &SqlitePool, limit: i64) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT url FROM precache_queue WHERE status = 'pending' ORDER BY queued_at, url LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(|row| row.get("url")).collect())
}

/// Mark a pre-cache entry done or errored.
pub async fn mark_precache(pool: &SqlitePool, url: &str, done: bool) -> Result<()> {
    sqlx::query("UPDATE precache_queue SET status = ? WHERE url = ?")
        .bind(if done { "done" } else { "error" })
        .bind(url)
        .execute(pool)
        .await?;

    Ok(())
}

/// Count pending pre-cache entries.
pub async fn pending_precache_count(pool: &SqlitePool) -> Result<u64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM precache_queue WHERE status = 'pending'")
            .fetch_one(pool)
            .await?;

    Ok(count as u64)
}

/// Drop finished pre-cache rows.
pub async fn clear_finished_precache(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM precache_queue WHERE status != 'pending'")
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
