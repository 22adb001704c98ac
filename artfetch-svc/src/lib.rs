//! artfetch-svc library interface
//!
//! Exposes the pipeline components and the HTTP service shell for
//! integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod library;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

use artfetch_common::events::EventBus;

use crate::library::MediaLibrary;
use crate::services::{CandidateSource, LanguagePolicy, TaskRegistry};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Single-active-task registry for scans/processing/pre-cache
    pub registry: TaskRegistry,
    /// Media library RPC boundary
    pub library: Arc<dyn MediaLibrary>,
    /// Provider artwork source
    pub source: Arc<dyn CandidateSource>,
    /// Language preferences for filtering and ranking
    pub policy: LanguagePolicy,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        library: Arc<dyn MediaLibrary>,
        source: Arc<dyn CandidateSource>,
        policy: LanguagePolicy,
    ) -> Self {
        Self {
            db,
            event_bus,
            registry: TaskRegistry::new(),
            library,
            source,
            policy,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/scan", post(api::scan::start_scan))
        .route("/scan/:session_id/cancel", post(api::scan::cancel_task))
        .route("/process", post(api::scan::start_process))
        .route("/precache/resume", post(api::scan::resume_precache))
        .route("/queue/status", get(api::queue::queue_status))
        .route("/sessions/:session_id", get(api::queue::get_session))
        .route(
            "/sessions/:session_id/report",
            get(api::queue::session_report),
        )
        .route("/report/latest", get(api::queue::latest_report))
        .route("/events", get(api::sse::event_stream))
        .route("/health", get(api::health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
