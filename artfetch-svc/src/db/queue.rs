//! Queue store: CRUD for `art_queue` and `art_items`.
//!
//! Enqueue is idempotent per (media_type, library_id): re-enqueueing resets
//! the row to pending instead of duplicating, and per-art-type sub-rows are
//! upserted in place. Batch writes run inside one transaction so an
//! interrupted scan never leaves partially written rows visible.

use artfetch_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{
    ArtItemEntry, ArtItemStatus, EnqueueSpec, MediaType, QueueEntry, QueueStatus,
};

fn placeholders(count: usize) -> String {
    std::iter::repeat("?")
        .take(count)
        .collect::<Vec<_>>()
        .join(",")
}

fn row_to_queue_entry(row: &sqlx::sqlite::SqliteRow) -> Result<QueueEntry> {
    let media_type: String = row.get("media_type");
    let status: String = row.get("status");
    let date_processed: Option<String> = row.get("date_processed");

    Ok(QueueEntry {
        id: row.get("id"),
        guid: row.get("guid"),
        media_type: media_type
            .parse()
            .map_err(Error::Internal)?,
        library_id: row.get("library_id"),
        title: row.get("title"),
        year: row.get("year"),
        status: status.parse().map_err(Error::Internal)?,
        scope: row.get("scope"),
        scan_session_id: row.get("scan_session_id"),
        date_processed: parse_timestamp(date_processed)?,
    })
}

fn row_to_art_item(row: &sqlx::sqlite::SqliteRow) -> Result<ArtItemEntry> {
    let art_type: String = row.get("art_type");
    let review_mode: String = row.get("review_mode");
    let status: String = row.get("status");
    let requires_manual: i64 = row.get("requires_manual");

    Ok(ArtItemEntry {
        id: row.get("id"),
        queue_id: row.get("queue_id"),
        art_type: art_type.parse().map_err(Error::Internal)?,
        baseline_url: row.get("baseline_url"),
        current_url: row.get("current_url"),
        selected_url: row.get("selected_url"),
        review_mode: review_mode.parse().map_err(Error::Internal)?,
        requires_manual: requires_manual != 0,
        status: status.parse().map_err(Error::Internal)?,
    })
}

fn parse_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::Internal(format!("bad timestamp {}: {}", s, e)))
    })
    .transpose()
}

/// Add a batch of items and their art slots to the queue in one transaction.
///
/// Returns the queue ids in input order.
pub async fn enqueue_batch(pool: &SqlitePool, specs: &[EnqueueSpec]) -> Result<Vec<i64>> {
    if specs.is_empty() {
        return Ok(Vec::new());
    }

    let now = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;

    for spec in specs {
        sqlx::query(
            r#"
            INSERT INTO art_queue (guid, media_type, library_id, title, year, priority, scope, scan_session_id, date_added)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(media_type, library_id) DO UPDATE SET
                status = 'pending',
                date_processed = NULL,
                title = excluded.title,
                year = excluded.year,
                scope = COALESCE(NULLIF(excluded.scope, ''), art_queue.scope),
                scan_session_id = COALESCE(excluded.scan_session_id, art_queue.scan_session_id)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(spec.media_type.as_str())
        .bind(spec.library_id)
        .bind(&spec.title)
        .bind(&spec.year)
        .bind(spec.priority)
        .bind(&spec.scope)
        .bind(spec.scan_session_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    let mut ids = Vec::with_capacity(specs.len());
    for spec in specs {
        let id: i64 = sqlx::query_scalar(
            "SELECT id FROM art_queue WHERE media_type = ? AND library_id = ?",
        )
        .bind(spec.media_type.as_str())
        .bind(spec.library_id)
        .fetch_one(&mut *tx)
        .await?;
        ids.push(id);
    }

    for (spec, queue_id) in specs.iter().zip(&ids) {
        for request in &spec.art_requests {
            sqlx::query(
                r#"
                INSERT INTO art_items (queue_id, art_type, baseline_url, current_url, review_mode, requires_manual, status, scan_session_id)
                VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)
                ON CONFLICT(queue_id, art_type) DO UPDATE SET
                    baseline_url = excluded.baseline_url,
                    current_url = excluded.current_url,
                    review_mode = excluded.review_mode,
                    requires_manual = excluded.requires_manual,
                    status = 'pending',
                    date_processed = NULL,
                    scan_session_id = excluded.scan_session_id
                "#,
            )
            .bind(queue_id)
            .bind(request.art_type.as_str())
            .bind(&request.baseline_url)
            .bind(&request.baseline_url)
            .bind(request.review_mode.as_str())
            .bind(request.requires_manual as i64)
            .bind(spec.scan_session_id)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    Ok(ids)
}

/// Add a single item to the queue, returning its queue id.
pub async fn enqueue(pool: &SqlitePool, spec: EnqueueSpec) -> Result<i64> {
    let ids = enqueue_batch(pool, std::slice::from_ref(&spec)).await?;
    Ok(ids[0])
}

/// Fetch the next batch of queue entries in (priority, insertion) order.
pub async fn next_batch(
    pool: &SqlitePool,
    limit: i64,
    status: QueueStatus,
    media_filter: Option<&[MediaType]>,
) -> Result<Vec<QueueEntry>> {
    let mut sql = String::from("SELECT * FROM art_queue WHERE status = ?");
    if let Some(types) = media_filter {
        if !types.is_empty() {
            sql.push_str(&format!(
                " AND media_type IN ({})",
                placeholders(types.len())
            ));
        }
    }
    sql.push_str(" ORDER BY priority ASC, id ASC LIMIT ?");

    let mut query = sqlx::query(&sql).bind(status.as_str());
    if let Some(types) = media_filter {
        for media_type in types {
            query = query.bind(media_type.as_str());
        }
    }
    query = query.bind(limit);

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(row_to_queue_entry).collect()
}

/// Fetch art items for several queue entries in one query.
pub async fn art_items_for(
    pool: &SqlitePool,
    queue_ids: &[i64],
) -> Result<HashMap<i64, Vec<ArtItemEntry>>> {
    let mut result: HashMap<i64, Vec<ArtItemEntry>> =
        queue_ids.iter().map(|id| (*id, Vec::new())).collect();

    if queue_ids.is_empty() {
        return Ok(result);
    }

    let sql = format!(
        "SELECT * FROM art_items WHERE queue_id IN ({}) ORDER BY id",
        placeholders(queue_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in queue_ids {
        query = query.bind(id);
    }

    for row in query.fetch_all(pool).await? {
        let item = row_to_art_item(&row)?;
        if let Some(items) = result.get_mut(&item.queue_id) {
            items.push(item);
        }
    }

    Ok(result)
}

/// Update queue entry status, stamping the processed time.
pub async fn set_queue_status(pool: &SqlitePool, queue_id: i64, status: QueueStatus) -> Result<()> {
    let processed = if status == QueueStatus::Pending {
        None
    } else {
        Some(Utc::now().to_rfc3339())
    };

    sqlx::query("UPDATE art_queue SET status = ?, date_processed = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(processed)
        .bind(queue_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Update art item status without touching the selected URL.
pub async fn set_art_item_status(
    pool: &SqlitePool,
    art_item_id: i64,
    status: ArtItemStatus,
) -> Result<()> {
    sqlx::query(
        "UPDATE art_items SET status = ?, date_processed = COALESCE(date_processed, ?) WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(Utc::now().to_rfc3339())
    .bind(art_item_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record the resolved URL for an art item and mark it completed.
pub async fn mark_art_item_selected(
    pool: &SqlitePool,
    art_item_id: i64,
    url: &str,
    auto_applied: bool,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE art_items
        SET selected_url = ?, auto_applied = ?, status = 'completed',
            requires_manual = 0, date_processed = ?
        WHERE id = ?
        "#,
    )
    .bind(url)
    .bind(auto_applied as i64)
    .bind(Utc::now().to_rfc3339())
    .bind(art_item_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Count queue entries matching the filter.
pub async fn count_queue_items(
    pool: &SqlitePool,
    status: Option<QueueStatus>,
    media_filter: Option<&[MediaType]>,
) -> Result<u64> {
    let mut sql = String::from("SELECT COUNT(*) FROM art_queue WHERE 1=1");
    if status.is_some() {
        sql.push_str(" AND status = ?");
    }
    if let Some(types) = media_filter {
        if !types.is_empty() {
            sql.push_str(&format!(
                " AND media_type IN ({})",
                placeholders(types.len())
            ));
        }
    }

    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if let Some(status) = status {
        query = query.bind(status.as_str());
    }
    if let Some(types) = media_filter {
        for media_type in types {
            query = query.bind(media_type.as_str());
        }
    }

    Ok(query.fetch_one(pool).await? as u64)
}

/// Count pending queue entries grouped by media type.
pub async fn pending_media_counts(pool: &SqlitePool) -> Result<HashMap<MediaType, u64>> {
    let rows = sqlx::query(
        "SELECT media_type, COUNT(*) AS count FROM art_queue WHERE status = 'pending' GROUP BY media_type",
    )
    .fetch_all(pool)
    .await?;

    let mut counts = HashMap::new();
    for row in rows {
        let media_type: String = row.get("media_type");
        let count: i64 = row.get("count");
        counts.insert(
            media_type.parse::<MediaType>().map_err(Error::Internal)?,
            count as u64,
        );
    }
    Ok(counts)
}

/// Queue statistics broken down by media type and status.
pub async fn queue_breakdown(pool: &SqlitePool) -> Result<HashMap<String, HashMap<String, u64>>> {
    let rows = sqlx::query(
        "SELECT media_type, status, COUNT(*) AS count FROM art_queue GROUP BY media_type, status",
    )
    .fetch_all(pool)
    .await?;

    let mut result: HashMap<String, HashMap<String, u64>> = HashMap::new();
    for row in rows {
        let media_type: String = row.get("media_type");
        let status: String = row.get("status");
        let count: i64 = row.get("count");
        result
            .entry(media_type)
            .or_default()
            .insert(status, count as u64);
    }
    Ok(result)
}

/// Count pending art items queued as missing artwork.
pub async fn count_pending_missing(
    pool: &SqlitePool,
    media_filter: Option<&[MediaType]>,
) -> Result<u64> {
    let mut sql = String::from(
        r#"
        SELECT COUNT(*)
        FROM art_items AS ai
        JOIN art_queue AS q ON ai.queue_id = q.id
        WHERE ai.status = 'pending'
          AND ai.review_mode = 'missing'
          AND q.status = 'pending'
        "#,
    );
    if let Some(types) = media_filter {
        if !types.is_empty() {
            sql.push_str(&format!(
                " AND q.media_type IN ({})",
                placeholders(types.len())
            ));
        }
    }

    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if let Some(types) = media_filter {
        for media_type in types {
            query = query.bind(media_type.as_str());
        }
    }

    Ok(query.fetch_one(pool).await? as u64)
}

/// Remove queue rows in a terminal state that have no pending art items.
///
/// Never removes a row that still has pending work.
pub async fn prune_inactive(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM art_queue
        WHERE status IN ('completed', 'skipped', 'cancelled', 'error')
          AND id NOT IN (
              SELECT DISTINCT queue_id FROM art_items WHERE status = 'pending'
          )
        "#,
    )
    .execute(pool)
    .await?;

    let removed = result.rows_affected();
    if removed > 0 {
        tracing::debug!(removed, "Pruned inactive queue items");
    }
    Ok(removed)
}

/// Reset queue rows back to pending when they still have pending art items.
pub async fn restore_pending_items(
    pool: &SqlitePool,
    media_filter: Option<&[MediaType]>,
) -> Result<u64> {
    let mut sql = String::from(
        r#"
        UPDATE art_queue
        SET status = 'pending', date_processed = NULL
        WHERE status != 'pending'
          AND id IN (
              SELECT DISTINCT queue_id FROM art_items WHERE status = 'pending'
          )
        "#,
    );
    if let Some(types) = media_filter {
        if !types.is_empty() {
            sql.push_str(&format!(
                " AND media_type IN ({})",
                placeholders(types.len())
            ));
        }
    }

    let mut query = sqlx::query(&sql);
    if let Some(types) = media_filter {
        for media_type in types {
            query = query.bind(media_type.as_str());
        }
    }

    Ok(query.execute(pool).await?.rows_affected())
}

/// Remove terminal queue rows processed more than `days_old` days ago.
pub async fn cleanup_old_entries(pool: &SqlitePool, days_old: i64) -> Result<u64> {
    let cutoff = (Utc::now() - chrono::Duration::days(days_old)).to_rfc3339();

    let result = sqlx::query(
        r#"
        DELETE FROM art_queue
        WHERE status IN ('completed', 'skipped', 'error')
          AND date_processed IS NOT NULL
          AND date_processed < ?
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    let deleted = result.rows_affected();
    if deleted > 0 {
        tracing::info!(deleted, "Cleaned up old queue items");
    }
    Ok(deleted)
}

/// Delete queue entries (and cascading art items) for the given media types.
pub async fn clear_for_media(pool: &SqlitePool, media_types: &[MediaType]) -> Result<()> {
    if media_types.is_empty() {
        return Ok(());
    }

    let sql = format!(
        "DELETE FROM art_queue WHERE media_type IN ({})",
        placeholders(media_types.len())
    );
    let mut query = sqlx::query(&sql);
    for media_type in media_types {
        query = query.bind(media_type.as_str());
    }
    query.execute(pool).await?;

    Ok(())
}
