//! Health and liveness handlers

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use std::time::Instant;

use crate::AppState;

/// Readiness: the process is up and knows its model.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let start = Instant::now();
    let resp = Json(json!({"ok": true, "model": state.config.model_table}));
    state
        .metrics
        .observe_request(StatusCode::OK, "/health", start.elapsed());
    resp
}

/// Liveness: no dependencies, no metrics, just proof the loop runs.
pub async fn ping() -> Json<Value> {
    Json(json!({"ok": true, "message": "pong"}))
}
