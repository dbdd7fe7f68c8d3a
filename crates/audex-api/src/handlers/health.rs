//! Health and readiness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use audex_queue::{JobQueue, QueueName};

use crate::state::AppState;

/// `GET /health` — liveness.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /ready` — readiness: the broker must be reachable.
pub async fn ready(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.queue.len(QueueName::Conversion).await {
        Ok(depth) => Ok(Json(json!({ "status": "ready", "conversion_depth": depth }))),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}
