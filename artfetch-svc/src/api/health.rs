//! Health check endpoint

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = (chrono::Utc::now() - state.startup_time).num_seconds();
    let task = state.registry.current().map(|info| info.name);

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime,
        "active_task": task,
    }))
}
