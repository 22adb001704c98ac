//! Queue and session inspection endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::db::{queue, sessions};
use crate::error::{ApiError, ApiResult};
use crate::services::report::render_session_report;
use crate::AppState;

/// GET /queue/status
pub async fn queue_status(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let breakdown = queue::queue_breakdown(&state.db).await?;
    let pending_by_media: std::collections::HashMap<String, u64> =
        queue::pending_media_counts(&state.db)
            .await?
            .into_iter()
            .map(|(media_type, count)| (media_type.as_str().to_string(), count))
            .collect();
    let pending_missing = queue::count_pending_missing(&state.db, None).await?;
    let precache_pending = crate::db::textures::pending_precache_count(&state.db).await?;

    Ok(Json(json!({
        "breakdown": breakdown,
        "pending_by_media": pending_by_media,
        "pending_missing": pending_missing,
        "precache_pending": precache_pending,
    })))
}

/// GET /sessions/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let session = sessions::get_session(&state.db, session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {}", session_id)))?;

    Ok(Json(serde_json::to_value(&session).map_err(|e| {
        ApiError::Internal(format!("serialize session: {}", e))
    })?))
}

/// GET /report/latest
///
/// Report for the most recent review/scan/auto-fetch session.
pub async fn latest_report(State(state): State<AppState>) -> ApiResult<String> {
    let session = sessions::last_review_session(&state.db, None)
        .await?
        .ok_or_else(|| ApiError::NotFound("no sessions recorded yet".to_string()))?;

    let media_filter = if session.media_types.is_empty() {
        None
    } else {
        Some(session.media_types.clone())
    };
    let pending_missing =
        queue::count_pending_missing(&state.db, media_filter.as_deref()).await?;

    Ok(render_session_report(&session, pending_missing))
}

/// GET /sessions/:session_id/report
pub async fn session_report(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> ApiResult<String> {
    let session = sessions::get_session(&state.db, session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {}", session_id)))?;

    let media_filter = if session.media_types.is_empty() {
        None
    } else {
        Some(session.media_types.clone())
    };
    let pending_missing =
        queue::count_pending_missing(&state.db, media_filter.as_deref()).await?;

    Ok(render_session_report(&session, pending_missing))
}
