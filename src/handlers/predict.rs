//! Prediction handler

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::time::Instant;

use crate::AppState;
use crate::bigquery::{BqParam, Row};
use crate::error::{AppError, AppResult};
use crate::normalize::{
    coerce_f64, coerce_i64, get_any, norm_cyl, norm_str, require_any, value_as_f64,
};

/// Normalized prediction inputs, echoed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionInput {
    pub year: i64,
    pub manufacturer: String,
    pub model: String,
    pub condition: String,
    pub cylinders: String,
    pub odometer: f64,
    pub transmission: String,
}

impl PredictionInput {
    /// Validate and normalize an untyped payload. Runs entirely before any
    /// outbound call.
    fn from_payload(payload: &Map<String, Value>) -> AppResult<Self> {
        let year = coerce_i64(require_any(payload, &["year"])?, "year")?;
        let odometer = coerce_f64(require_any(payload, &["odometer"])?, "odometer")?;
        let manufacturer = norm_str(require_any(payload, &["manufacturer", "make"])?);
        let model = norm_str(require_any(payload, &["model"])?);
        let condition = norm_str(require_any(payload, &["condition"])?);
        let cylinders = norm_cyl(get_any(payload, &["cylinders"]));
        let transmission = norm_str(require_any(payload, &["transmission"])?);

        Ok(Self {
            year,
            manufacturer,
            model,
            condition,
            cylinders,
            odometer,
            transmission,
        })
    }
}

pub async fn predict(State(state): State<AppState>, body: Bytes) -> Response {
    let start = Instant::now();
    let route = "/predict";

    let response = match run_prediction(&state, &body).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => e.into_response(),
    };

    state
        .metrics
        .observe_request(response.status(), route, start.elapsed());
    response
}

async fn run_prediction(state: &AppState, body: &[u8]) -> AppResult<Value> {
    let payload = parse_payload(body)?;
    let input = PredictionInput::from_payload(&payload)?;

    tracing::info!("Predict payload: {:?}", input);

    // The model name is operator configuration; every request field is
    // bound as a typed parameter, never spliced into the query text.
    let sql = format!(
        "SELECT * FROM ML.PREDICT(MODEL `{}`, (SELECT \
         @year AS year, \
         @manufacturer AS manufacturer, \
         @model AS model, \
         @condition AS condition, \
         @cylinders AS cylinders, \
         @odometer AS odometer, \
         @transmission AS transmission))",
        state.config.model_table
    );
    let params = [
        BqParam::int64("year", input.year),
        BqParam::string("manufacturer", &input.manufacturer),
        BqParam::string("model", &input.model),
        BqParam::string("condition", &input.condition),
        BqParam::string("cylinders", &input.cylinders),
        BqParam::float64("odometer", input.odometer),
        BqParam::string("transmission", &input.transmission),
    ];

    tracing::info!("Calling ML.PREDICT on model: {}", state.config.model_table);
    let rows = state.bq.query(&sql, &params).await?;
    let row = rows.into_iter().next().ok_or(AppError::EmptyResult)?;

    let predicted = extract_predicted(&row)?;

    Ok(json!({
        "predicted_price": predicted,
        "inputs": input,
        "raw": row,
    }))
}

/// Parse the request body: empty bodies and non-object JSON act as an empty
/// mapping, malformed JSON is the caller's mistake.
fn parse_payload(body: &[u8]) -> AppResult<Map<String, Value>> {
    if body.is_empty() {
        return Ok(Map::new());
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidInput(format!("Request body is not valid JSON: {e}")))?;
    Ok(value.as_object().cloned().unwrap_or_default())
}

/// Locate the predicted value in the first row: the well-known column names
/// first, then the first numeric value in column order.
///
/// The positional fallback is fragile — any stray numeric column can win —
/// but it is the contract callers rely on.
fn extract_predicted(row: &Row) -> AppResult<f64> {
    let named = ["predicted_price", "predicted_value", "price"]
        .iter()
        .find_map(|k| row.get(*k).filter(|v| !v.is_null()));

    if let Some(v) = named {
        return value_as_f64(v)
            .ok_or_else(|| AppError::PredictionNotNumeric(v.to_string()));
    }

    row.values()
        .find_map(value_as_f64)
        .ok_or_else(|| AppError::PredictionColumnNotFound(row.keys().cloned().collect()))
}
