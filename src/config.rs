//! Configuration module

use anyhow::{Context, Result, bail};
use std::env;

/// Public BigQuery v2 REST endpoint.
pub const DEFAULT_BQ_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Fully-qualified model resource, `project.dataset.model`
    pub model_table: String,

    /// Server port
    pub port: u16,

    /// BigQuery REST endpoint, overridable for emulators and tests
    pub bq_api_base: String,

    /// Static OAuth bearer token; when unset the client asks the GCE
    /// metadata server per call
    pub bq_access_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let model_table = env::var("MODEL_TABLE").map_err(|_| {
            anyhow::anyhow!(
                "Missing env var MODEL_TABLE, e.g. used-car-pricing.used_car_dataset.used_car_model_automl"
            )
        })?;
        if !model_table.contains('.') {
            bail!("MODEL_TABLE must be fully qualified as project.dataset.model, got `{model_table}`");
        }

        let port = match env::var("PORT") {
            Ok(p) => p
                .parse()
                .with_context(|| format!("Invalid PORT value `{p}`"))?,
            Err(_) => 8080,
        };

        let bq_api_base =
            env::var("BQ_API_BASE").unwrap_or_else(|_| DEFAULT_BQ_API_BASE.to_string());

        let bq_access_token = env::var("BQ_ACCESS_TOKEN").ok();

        Ok(Self {
            model_table,
            port,
            bq_api_base,
            bq_access_token,
        })
    }

    /// Project the query jobs run in: the first segment of the model name.
    pub fn project(&self) -> &str {
        self.model_table.split('.').next().unwrap_or_default()
    }
}
