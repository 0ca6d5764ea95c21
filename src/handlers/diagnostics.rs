//! Engine self-test and metrics exposition

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::AppState;

/// Round-trip a trivial query to verify connectivity and permissions.
pub async fn bq_test(State(state): State<AppState>) -> Response {
    tracing::info!("Running BQ self-test SELECT 1");

    match state.bq.query("SELECT 1 AS ok", &[]).await {
        Ok(rows) if !rows.is_empty() => {
            (StatusCode::OK, Json(json!({"ok": true, "row": rows[0]}))).into_response()
        }
        Ok(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "ok": false,
                "where": "bq_test",
                "detail": "self-test returned no rows"
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("BQ TEST ERROR: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "ok": false,
                    "where": "bq_test",
                    "detail": e.to_string()
                })),
            )
                .into_response()
        }
    }
}

/// Prometheus text exposition of the shared registry.
pub async fn metrics(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, state.metrics.content_type())],
        state.metrics.render(),
    )
        .into_response()
}
