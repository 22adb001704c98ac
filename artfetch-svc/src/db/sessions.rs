//! Scan session persistence.
//!
//! At most one active or paused session exists per distinct media-type-set
//! scope; callers either resume the paused session or cancel it and start
//! fresh. Sessions are never merged.

use artfetch_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

use crate::models::{ArtType, MediaType, ScanSession, SessionStats};

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<ScanSession> {
    let status: String = row.get("status");
    let media_types: String = row.get("media_types");
    let art_types: String = row.get("art_types");
    let stats: String = row.get("stats");
    let started: String = row.get("started");
    let last_activity: String = row.get("last_activity");
    let completed: Option<String> = row.get("completed");

    let media_types: Vec<MediaType> = serde_json::from_str(&media_types)
        .map_err(|e| Error::Internal(format!("bad media_types blob: {}", e)))?;
    let art_types: Vec<ArtType> = serde_json::from_str(&art_types)
        .map_err(|e| Error::Internal(format!("bad art_types blob: {}", e)))?;

    Ok(ScanSession {
        id: row.get("id"),
        scan_type: row.get("scan_type"),
        status: status.parse().map_err(Error::Internal)?,
        media_types,
        art_types,
        stats: SessionStats::from_json(Some(&stats)),
        started: parse_ts(&started)?,
        last_activity: parse_ts(&last_activity)?,
        completed: completed.as_deref().map(parse_ts).transpose()?,
    })
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("bad timestamp {}: {}", raw, e)))
}

/// Create a new scan session and return its id.
pub async fn create_session(
    pool: &SqlitePool,
    scan_type: &str,
    media_types: &[MediaType],
    art_types: &[ArtType],
) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    let media_blob = serde_json::to_string(media_types)
        .map_err(|e| Error::Internal(format!("serialize media_types: {}", e)))?;
    let art_blob = serde_json::to_string(art_types)
        .map_err(|e| Error::Internal(format!("serialize art_types: {}", e)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO scan_sessions (scan_type, status, media_types, art_types, stats, started, last_activity)
        VALUES (?, 'active', ?, ?, '{}', ?, ?)
        "#,
    )
    .bind(scan_type)
    .bind(media_blob)
    .bind(art_blob)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Load a session by id.
pub async fn get_session(pool: &SqlitePool, session_id: i64) -> Result<Option<ScanSession>> {
    let row = sqlx::query("SELECT * FROM scan_sessions WHERE id = ?")
        .bind(session_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_session).transpose()
}

/// Persist the stats blob and bump last_activity.
pub async fn update_stats(pool: &SqlitePool, session_id: i64, stats: &SessionStats) -> Result<()> {
    sqlx::query("UPDATE scan_sessions SET stats = ?, last_activity = ? WHERE id = ?")
        .bind(stats.to_json())
        .bind(Utc::now().to_rfc3339())
        .bind(session_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Mark a session paused with its current stats.
pub async fn pause_session(pool: &SqlitePool, session_id: i64, stats: &SessionStats) -> Result<()> {
    sqlx::query("UPDATE scan_sessions SET status = 'paused', stats = ?, last_activity = ? WHERE id = ?")
        .bind(stats.to_json())
        .bind(Utc::now().to_rfc3339())
        .bind(session_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Mark a session active again (on resume).
pub async fn resume_session(pool: &SqlitePool, session_id: i64) -> Result<()> {
    sqlx::query("UPDATE scan_sessions SET status = 'active', last_activity = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(session_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Mark a session completed.
pub async fn complete_session(pool: &SqlitePool, session_id: i64) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE scan_sessions SET status = 'completed', completed = ?, last_activity = ? WHERE id = ?")
        .bind(&now)
        .bind(&now)
        .bind(session_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Mark a session cancelled.
pub async fn cancel_session(pool: &SqlitePool, session_id: i64) -> Result<()> {
    sqlx::query("UPDATE scan_sessions SET status = 'cancelled', last_activity = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(session_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// All paused sessions, most recent activity first.
pub async fn paused_sessions(pool: &SqlitePool) -> Result<Vec<ScanSession>> {
    let rows = sqlx::query(
        "SELECT * FROM scan_sessions WHERE status = 'paused' ORDER BY last_activity DESC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_session).collect()
}

/// Find a paused session of one of the given scan types whose media-type set
/// matches exactly.
pub async fn find_matching_paused(
    pool: &SqlitePool,
    scan_types: &[&str],
    media_types: &[MediaType],
) -> Result<Option<ScanSession>> {
    let target: HashSet<MediaType> = media_types.iter().copied().collect();

    for session in paused_sessions(pool).await? {
        if !scan_types.contains(&session.scan_type.as_str()) {
            continue;
        }
        let stored: HashSet<MediaType> = session.media_types.iter().copied().collect();
        if stored == target {
            return Ok(Some(session));
        }
    }

    Ok(None)
}

/// Most recent manual review session, optionally restricted to an exact
/// media-type set.
pub async fn last_review_session(
    pool: &SqlitePool,
    media_filter: Option<&[MediaType]>,
) -> Result<Option<ScanSession>> {
    let rows = sqlx::query(
        "SELECT * FROM scan_sessions WHERE scan_type IN ('manual_review', 'missing_art', 'auto_fetch') ORDER BY last_activity DESC",
    )
    .fetch_all(pool)
    .await?;

    let target: Option<HashSet<MediaType>> =
        media_filter.map(|types| types.iter().copied().collect());

    for row in &rows {
        let session = row_to_session(row)?;
        match &target {
            None => return Ok(Some(session)),
            Some(target) => {
                let stored: HashSet<MediaType> = session.media_types.iter().copied().collect();
                if stored == *target {
                    return Ok(Some(session));
                }
            }
        }
    }

    Ok(None)
}

/// Mark sessions left active by a dead process as paused.
///
/// A session still `active` at startup belongs to a previous run and will
/// never progress on its own; pausing keeps it resumable.
pub async fn pause_orphaned_sessions(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE scan_sessions SET status = 'paused', last_activity = ? WHERE status = 'active'",
    )
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
