//! Scan, processor and pre-cache endpoints.
//!
//! Long-running work is spawned onto a background task; the handler returns
//! 202 with the session id immediately. The task registry keeps runs
//! mutually exclusive.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::models::MediaType;
use crate::services::{
    PrecachePool, Processor, ScanOptions, ScanScope, Scanner, UpgradeThresholds,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StartScanRequest {
    pub scope: String,
    #[serde(default)]
    pub include_upgrades: bool,
    #[serde(default)]
    pub confirm_precache: bool,
    /// Resume this paused session instead of starting fresh
    pub resume_session: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StartProcessRequest {
    pub scope: Option<String>,
    /// Attach the run report to this session
    pub session_id: Option<i64>,
}

fn parse_scope(raw: &str) -> Result<ScanScope, ApiError> {
    raw.parse::<ScanScope>().map_err(ApiError::BadRequest)
}

fn media_filter_for(scope: Option<&str>) -> Result<Option<Vec<MediaType>>, ApiError> {
    match scope {
        None => Ok(None),
        Some("all") => Ok(None),
        Some(raw) => Ok(Some(parse_scope(raw)?.media_types())),
    }
}

/// POST /scan
pub async fn start_scan(
    State(state): State<AppState>,
    Json(request): Json<StartScanRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let scope = parse_scope(&request.scope)?;

    let handle = state
        .registry
        .register("library_scan")
        .map_err(|busy| ApiError::Conflict(busy.to_string()))?;
    handle.spawn_heartbeat();

    let scanner = Scanner::new(
        state.db.clone(),
        state.library.clone(),
        state.source.clone(),
        state.event_bus.clone(),
        state.policy.clone(),
        ScanOptions {
            include_upgrades: request.include_upgrades,
            confirm_precache: request.confirm_precache,
            art_types: None,
            thresholds: UpgradeThresholds::default(),
        },
    );

    let session_id = scanner
        .begin_session(scope, request.resume_session)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tokio::spawn(async move {
        let token = handle.token.clone();
        match scanner.scan(scope, session_id, &token).await {
            Ok(outcome) => {
                tracing::info!(session_id, status = ?outcome.status, "Scan task finished");
            }
            Err(e) => {
                tracing::error!(session_id, "Scan task failed: {}", e);
            }
        }
        drop(handle);
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"session_id": session_id})),
    ))
}

/// POST /scan/:session_id/cancel
///
/// Pauses the running task; queued work stays durable.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let cancelled = state.registry.cancel_current();
    Ok(Json(json!({
        "session_id": session_id,
        "cancelled": cancelled,
    })))
}

/// POST /process
pub async fn start_process(
    State(state): State<AppState>,
    Json(request): Json<StartProcessRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let media_filter = media_filter_for(request.scope.as_deref())?;

    let handle = state
        .registry
        .register("auto_apply")
        .map_err(|busy| ApiError::Conflict(busy.to_string()))?;
    handle.spawn_heartbeat();

    let processor = Processor::new(
        state.db.clone(),
        state.library.clone(),
        state.source.clone(),
        state.event_bus.clone(),
        state.policy.clone(),
    );
    let session_id = request.session_id;

    tokio::spawn(async move {
        let token = handle.token.clone();
        match processor.process(media_filter, session_id, &token).await {
            Ok(report) => {
                tracing::info!(
                    auto_applied = report.auto_applied,
                    skipped = report.skipped,
                    "Process task finished"
                );
            }
            Err(e) => {
                tracing::error!("Process task failed: {}", e);
            }
        }
        drop(handle);
    });

    Ok((StatusCode::ACCEPTED, Json(json!({"started": true}))))
}

/// POST /precache/resume
///
/// Resume the bulk texture caching pass on its own; discovery is not
/// re-run.
pub async fn resume_precache(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let pending = crate::db::textures::pending_precache_count(&state.db).await?;
    if pending == 0 {
        return Ok((StatusCode::OK, Json(json!({"pending": 0}))));
    }

    let handle = state
        .registry
        .register("texture_precache")
        .map_err(|busy| ApiError::Conflict(busy.to_string()))?;
    handle.spawn_heartbeat();

    let pool = PrecachePool::new(state.db.clone(), state.event_bus.clone());

    tokio::spawn(async move {
        let token = handle.token.clone();
        match pool.run(&token).await {
            Ok(stats) => {
                tracing::info!(
                    completed = stats.completed,
                    remaining = stats.remaining,
                    "Pre-cache task finished"
                );
            }
            Err(e) => {
                tracing::error!("Pre-cache task failed: {}", e);
            }
        }
        drop(handle);
    });

    Ok((StatusCode::ACCEPTED, Json(json!({"pending": pending}))))
}
