//! Error handling

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::any::Any;

use crate::bigquery::BqError;
use crate::metrics::Metrics;

pub type AppResult<T> = Result<T, AppError>;

/// Everything a request handler can fail with.
///
/// Validation failures resolve locally as 400s before any outbound call;
/// everything else surfaces as a structured 500 with an error-kind tag.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Required field absent (or null) under every accepted key.
    #[error("{0}")]
    MissingField(String),

    /// Field present but not coercible to its declared type.
    #[error("{0}")]
    InvalidInput(String),

    /// The engine returned an empty result set.
    #[error("No rows returned from ML.PREDICT")]
    EmptyResult,

    /// A well-known prediction column exists but holds a non-numeric value.
    #[error("Prediction column is not numeric: {0}")]
    PredictionNotNumeric(String),

    /// No column held a numeric prediction.
    #[error("Prediction column not found. keys={0:?}")]
    PredictionColumnNotFound(Vec<String>),

    /// Engine-side failure, already categorized by the client.
    #[error(transparent)]
    Engine(#[from] BqError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let detail = self.to_string();
        let (status, error) = match &self {
            AppError::MissingField(_) | AppError::InvalidInput(_) => {
                tracing::debug!("Invalid input: {}", detail);
                (StatusCode::BAD_REQUEST, "Invalid input")
            }
            AppError::EmptyResult
            | AppError::PredictionNotNumeric(_)
            | AppError::PredictionColumnNotFound(_) => {
                tracing::error!("Predict ERROR: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "Prediction failed")
            }
            AppError::Engine(BqError::BadRequest(_)) => {
                tracing::error!("BQ BadRequest: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "BQ BadRequest")
            }
            AppError::Engine(_) => {
                tracing::error!("BQ error: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "BQ error")
            }
        };

        let body = Json(json!({
            "error": error,
            "detail": detail
        }));

        (status, body).into_response()
    }
}

/// Outermost boundary: turns a handler panic into a structured 500, counted
/// under the `uncaught` route label.
pub fn panic_response(metrics: &Metrics, err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };

    tracing::error!("UNCAUGHT ERROR: {}", detail);
    metrics.inc_request(StatusCode::INTERNAL_SERVER_ERROR, "uncaught");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "Internal error", "detail": detail})),
    )
        .into_response()
}
