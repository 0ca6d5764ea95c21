//! BigQuery REST client
//!
//! Thin client for the BigQuery v2 `queries` endpoint. Queries are always
//! parameterized: the caller hands over typed named parameters and gets
//! back rows as ordered column → value maps.

use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;

/// A decoded result row: column name → value, in schema order.
pub type Row = Map<String, Value>;

/// Default service-account token endpoint inside GCE/Cloud Run.
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Client configuration
#[derive(Debug, Clone)]
pub struct BqConfig {
    /// REST endpoint base, e.g. `https://bigquery.googleapis.com/bigquery/v2`
    pub api_base: String,

    /// Project the query jobs run in
    pub project: String,

    /// Static OAuth bearer token; when unset the metadata server is asked
    /// for one on every call
    pub access_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum BqError {
    #[error("BigQuery rejected the query: {0}")]
    BadRequest(String),

    #[error("BigQuery API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("BigQuery transport error: {0}")]
    Transport(String),

    #[error("Malformed BigQuery response: {0}")]
    Decode(String),
}

/// Declared type of a named query parameter.
#[derive(Debug, Clone, Copy)]
pub enum BqParamType {
    Int64,
    Float64,
    String,
}

impl BqParamType {
    fn as_str(self) -> &'static str {
        match self {
            BqParamType::Int64 => "INT64",
            BqParamType::Float64 => "FLOAT64",
            BqParamType::String => "STRING",
        }
    }
}

/// A named scalar parameter bound into a query.
#[derive(Debug, Clone)]
pub struct BqParam {
    name: &'static str,
    ty: BqParamType,
    value: String,
}

impl BqParam {
    pub fn int64(name: &'static str, value: i64) -> Self {
        Self {
            name,
            ty: BqParamType::Int64,
            value: value.to_string(),
        }
    }

    pub fn float64(name: &'static str, value: f64) -> Self {
        Self {
            name,
            ty: BqParamType::Float64,
            value: value.to_string(),
        }
    }

    pub fn string(name: &'static str, value: &str) -> Self {
        Self {
            name,
            ty: BqParamType::String,
            value: value.to_string(),
        }
    }

    /// REST wire shape: scalar values travel as strings.
    fn to_wire(&self) -> Value {
        json!({
            "name": self.name,
            "parameterType": { "type": self.ty.as_str() },
            "parameterValue": { "value": self.value },
        })
    }
}

// Wire shapes shared by `jobs.query` and `jobs.getQueryResults`.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_complete: Option<bool>,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    fields: Vec<TableField>,
}

#[derive(Debug, Deserialize)]
struct TableField {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

/// BigQuery API client
#[derive(Clone)]
pub struct BqClient {
    config: BqConfig,
    http: reqwest::Client,
}

impl BqClient {
    /// Create new client. No request timeout: a hung query holds its
    /// request open until the deployment's own deadline cuts it.
    pub fn new(config: BqConfig) -> Self {
        let http = reqwest::Client::builder()
            .build()
            .expect("Failed to create HTTP client");

        Self { config, http }
    }

    /// Run a query and wait for its full result set.
    pub async fn query(&self, sql: &str, params: &[BqParam]) -> Result<Vec<Row>, BqError> {
        let url = format!(
            "{}/projects/{}/queries",
            self.config.api_base, self.config.project
        );

        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "parameterMode": "NAMED",
            "queryParameters": params.iter().map(BqParam::to_wire).collect::<Vec<_>>(),
        });

        let token = self.auth_token().await?;

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| BqError::Transport(e.to_string()))?;

        let mut result = decode_response(response).await?;

        // The endpoint long-polls; a slow job comes back incomplete and is
        // fetched again under its job id until done.
        while !result.job_complete.unwrap_or(true) {
            let job = result
                .job_reference
                .as_ref()
                .ok_or_else(|| BqError::Decode("incomplete job without a job reference".into()))?;

            let mut poll_url = format!(
                "{}/projects/{}/queries/{}",
                self.config.api_base, self.config.project, job.job_id
            );
            if let Some(location) = &job.location {
                poll_url.push_str("?location=");
                poll_url.push_str(location);
            }

            tracing::debug!("Query job {} still running, polling", job.job_id);

            let response = self
                .http
                .get(&poll_url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| BqError::Transport(e.to_string()))?;

            result = decode_response(response).await?;
        }

        decode_rows(&result)
    }

    async fn auth_token(&self) -> Result<String, BqError> {
        if let Some(token) = &self.config.access_token {
            return Ok(token.clone());
        }
        self.metadata_token().await
    }

    /// Default service-account token from the GCE metadata server.
    async fn metadata_token(&self) -> Result<String, BqError> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let response = self
            .http
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| BqError::Transport(format!("metadata server unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(BqError::Api {
                status: response.status().as_u16(),
                message: "metadata server refused a token".into(),
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map(|t| t.access_token)
            .map_err(|e| BqError::Decode(e.to_string()))
    }
}

/// Classify a response: 2xx parses as a result, HTTP 400 is a rejected
/// query, everything else is a generic API error.
async fn decode_response(response: reqwest::Response) -> Result<QueryResponse, BqError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<QueryResponse>()
            .await
            .map_err(|e| BqError::Decode(e.to_string()));
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorEnvelope>(&text)
        .ok()
        .and_then(|e| e.error)
        .and_then(|e| e.message)
        .unwrap_or(text);

    if status == reqwest::StatusCode::BAD_REQUEST {
        Err(BqError::BadRequest(message))
    } else {
        Err(BqError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn decode_rows(result: &QueryResponse) -> Result<Vec<Row>, BqError> {
    let Some(schema) = &result.schema else {
        return Ok(Vec::new());
    };

    result
        .rows
        .iter()
        .map(|row| {
            if row.f.len() != schema.fields.len() {
                return Err(BqError::Decode(format!(
                    "row has {} cells but schema has {} fields",
                    row.f.len(),
                    schema.fields.len()
                )));
            }
            let mut decoded = Row::new();
            for (field, cell) in schema.fields.iter().zip(&row.f) {
                decoded.insert(field.name.clone(), decode_cell(&field.field_type, &cell.v));
            }
            Ok(decoded)
        })
        .collect()
}

/// Restore a typed value from the wire encoding, which carries every scalar
/// as a string.
fn decode_cell(field_type: &str, v: &Value) -> Value {
    let Value::String(s) = v else {
        // Nulls and nested shapes pass through untouched.
        return v.clone();
    };

    match field_type {
        "INTEGER" | "INT64" => s.parse::<i64>().map(Value::from).unwrap_or_else(|_| v.clone()),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => {
            s.parse::<f64>().map(Value::from).unwrap_or_else(|_| v.clone())
        }
        "BOOLEAN" | "BOOL" => match s.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => v.clone(),
        },
        _ => v.clone(),
    }
}
