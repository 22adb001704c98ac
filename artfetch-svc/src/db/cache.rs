//! Provider response cache with release-age based TTL.
//!
//! Rows are keyed (media_type, media_id, source, art_type). A completion
//! marker pseudo-row records that a full multi-type fetch already ran for an
//! item, short-circuiting repeat provider calls.

use artfetch_common::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::models::ArtworkCandidate;

/// Pseudo art type marking a finished multi-type fetch.
pub const COMPLETION_MARKER: &str = "_full_fetch_complete";

/// TTL tiers derived from release age. Fresh releases keep short TTLs since
/// providers still accumulate artwork; decades-old media barely changes.
pub fn cache_ttl_hours(release_date: Option<&str>, now: DateTime<Utc>) -> i64 {
    let age_years = release_date
        .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        .map(|date| {
            let days = (now.date_naive() - date).num_days();
            days as f64 / 365.25
        });

    match age_years {
        Some(age) if age > 10.0 => 4320,
        Some(age) if age > 2.0 => 720,
        _ => 72,
    }
}

/// Look up cached artwork, honoring expiry.
pub async fn get_cached(
    pool: &SqlitePool,
    media_type: &str,
    media_id: &str,
    source: &str,
    art_type: &str,
) -> Result<Option<Vec<ArtworkCandidate>>> {
    let row = sqlx::query(
        r#"
        SELECT data, expires_at FROM artwork_cache
        WHERE media_type = ? AND media_id = ? AND source = ? AND art_type = ?
        "#,
    )
    .bind(media_type)
    .bind(media_id)
    .bind(source)
    .bind(art_type)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let expires_at: String = row.get("expires_at");
    if is_expired(&expires_at) {
        return Ok(None);
    }

    let data: String = row.get("data");
    match serde_json::from_str(&data) {
        Ok(candidates) => Ok(Some(candidates)),
        Err(e) => {
            tracing::error!("Failed to parse cached artwork: {}", e);
            Ok(None)
        }
    }
}

/// Look up cached artwork for several (source, media_id) pairs at once.
///
/// Returns a map keyed by (source, art_type); expired rows are skipped.
pub async fn get_cached_batch(
    pool: &SqlitePool,
    media_type: &str,
    media_ids: &[(String, String)],
) -> Result<HashMap<(String, String), Vec<ArtworkCandidate>>> {
    let mut result = HashMap::new();
    if media_ids.is_empty() {
        return Ok(result);
    }

    let conditions = media_ids
        .iter()
        .map(|_| "(source = ? AND media_id = ?)")
        .collect::<Vec<_>>()
        .join(" OR ");
    let sql = format!(
        "SELECT source, art_type, data, expires_at FROM artwork_cache WHERE media_type = ? AND ({}) AND art_type != ?",
        conditions
    );

    let mut query = sqlx::query(&sql).bind(media_type);
    for (source, media_id) in media_ids {
        query = query.bind(source).bind(media_id);
    }
    query = query.bind(COMPLETION_MARKER);

    for row in query.fetch_all(pool).await? {
        let expires_at: String = row.get("expires_at");
        if is_expired(&expires_at) {
            continue;
        }

        let source: String = row.get("source");
        let art_type: String = row.get("art_type");
        let data: String = row.get("data");
        match serde_json::from_str::<Vec<ArtworkCandidate>>(&data) {
            Ok(candidates) => {
                result.insert((source, art_type), candidates);
            }
            Err(e) => {
                tracing::error!("Failed to parse cached artwork: {}", e);
            }
        }
    }

    Ok(result)
}

/// Store artwork for one (source, art_type) slot.
pub async fn put_cached(
    pool: &SqlitePool,
    media_type: &str,
    media_id: &str,
    source: &str,
    art_type: &str,
    data: &[ArtworkCandidate],
    release_date: Option<&str>,
    ttl_hours: i64,
) -> Result<()> {
    let now = Utc::now();
    let expires_at = now + chrono::Duration::hours(ttl_hours);
    let blob = serde_json::to_string(data)
        .map_err(|e| artfetch_common::Error::Internal(format!("serialize artwork: {}", e)))?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO artwork_cache
            (media_type, media_id, source, art_type, data, release_date, cached_at, expires_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(media_type)
    .bind(media_id)
    .bind(source)
    .bind(art_type)
    .bind(blob)
    .bind(release_date)
    .bind(now.to_rfc3339())
    .bind(expires_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Check for a non-expired completion marker.
pub async fn has_completion_marker(
    pool: &SqlitePool,
    media_type: &str,
    media_id: &str,
) -> Result<bool> {
    Ok(
        get_cached(pool, media_type, media_id, "system", COMPLETION_MARKER)
            .await?
            .is_some(),
    )
}

/// Write the completion marker after a full multi-type fetch.
pub async fn write_completion_marker(
    pool: &SqlitePool,
    media_type: &str,
    media_id: &str,
    release_date: Option<&str>,
    ttl_hours: i64,
) -> Result<()> {
    put_cached(
        pool,
        media_type,
        media_id,
        "system",
        COMPLETION_MARKER,
        &[],
        release_date,
        ttl_hours,
    )
    .await
}

/// Remove expired cache rows. Returns the number removed.
pub async fn clear_expired(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM artwork_cache WHERE expires_at < ?")
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

fn is_expired(expires_at: &str) -> bool {
    match DateTime::parse_from_rfc3339(expires_at) {
        Ok(expiry) => Utc::now() > expiry.with_timezone(&Utc),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_ttl_recent_release_is_short() {
        assert_eq!(cache_ttl_hours(Some("2024-03-01"), now()), 72);
    }

    #[test]
    fn test_ttl_mid_age_release() {
        assert_eq!(cache_ttl_hours(Some("2018-01-01"), now()), 720);
    }

    #[test]
    fn test_ttl_decades_old_release_is_long() {
        assert_eq!(cache_ttl_hours(Some("1979-05-25"), now()), 4320);
    }

    #[test]
    fn test_ttl_unknown_release_is_short() {
        assert_eq!(cache_ttl_hours(None, now()), 72);
        assert_eq!(cache_ttl_hours(Some("not-a-date"), now()), 72);
    }
}
