//! Pricing Prediction Gateway
//!
//! HTTP façade in front of a BigQuery ML regression model for used-vehicle
//! pricing. Validates and normalizes a prediction payload, runs a
//! parameterized `ML.PREDICT` query, and returns the predicted price.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                   PRICING GATEWAY                          │
//! ├────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │  HTTP     │  │  Normalizer  │  │  Prometheus        │  │
//! │  │  Routes   │  │  (payload →  │  │  Registry          │  │
//! │  │  (Axum)   │  │   typed)     │  │  (counters, hist)  │  │
//! │  └─────┬─────┘  └──────┬───────┘  └────────────────────┘  │
//! │        └───────────────┼─────────────┐                    │
//! │                        ▼             │                    │
//! │                 ┌─────────────┐      │                    │
//! │                 │  BigQuery   │◄─────┘                    │
//! │                 │  ML.PREDICT │                           │
//! │                 └─────────────┘                           │
//! └────────────────────────────────────────────────────────────┘
//! ```

mod bigquery;
mod config;
mod error;
mod handlers;
mod metrics;
mod normalize;

use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pricing_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env().expect("Invalid configuration");

    tracing::info!("Pricing gateway starting...");
    tracing::info!("Model: {}", config.model_table);

    // Remote engine client
    let bq = bigquery::BqClient::new(bigquery::BqConfig {
        api_base: config.bq_api_base.clone(),
        project: config.project().to_string(),
        access_token: config.bq_access_token.clone(),
    });

    // Process-wide metrics registry
    let metrics = metrics::Metrics::new().expect("Failed to build metrics registry");

    // Build application state
    let state = AppState {
        config: config.clone(),
        bq,
        metrics,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub bq: bigquery::BqClient,
    pub metrics: metrics::Metrics,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    let panic_metrics = state.metrics.clone();

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ping", get(handlers::health::ping))
        .route("/bq_test", get(handlers::diagnostics::bq_test))
        .route("/predict", post(handlers::predict::predict))
        .route("/metrics", get(handlers::diagnostics::metrics))
        .layer(TraceLayer::new_for_http())
        // Outermost: nothing escapes as an unstructured response.
        .layer(CatchPanicLayer::custom(
            move |err: Box<dyn std::any::Any + Send + 'static>| {
                error::panic_response(&panic_metrics, err)
            },
        ))
        .with_state(state)
}
