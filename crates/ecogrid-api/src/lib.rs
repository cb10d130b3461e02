//! ecogrid-api — REST API for EcoGrid.
//!
//! Provides axum route handlers for metric ingestion, per-server
//! analysis, migration plans, service eco-profiles, and power forecasts.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/metrics/:server_id` | Ingest a batch of samples |
//! | GET | `/api/v1/metrics/:server_id` | Retained samples for a server |
//! | GET | `/api/v1/analysis/:server_id` | Statistical report + eco-score |
//! | GET | `/api/v1/forecast/:server_id` | Power forecast for a server |
//! | GET | `/api/v1/plans` | Active migration plans |
//! | GET | `/api/v1/profiles` | All service eco-profiles |
//! | GET | `/api/v1/profiles/:service` | One service eco-profile |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/healthz` | Liveness probe |
//!
//! All `/api/v1` routes sit behind the `X-API-Key` check when a key is
//! configured; `/metrics` and `/healthz` stay open for scrapers and
//! probes.

pub mod handlers;
pub mod middleware;
pub mod prometheus;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use serde::Deserialize;

use ecogrid_forecast::Predictor;
use ecogrid_planner::Planner;
use ecogrid_score::Analyzer;
use ecogrid_store::MetricStore;
use ecogrid_tags::TagManager;

/// API surface configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Required `X-API-Key` value; `None` disables authentication.
    pub api_key: Option<String>,
}

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: MetricStore,
    pub analyzer: Analyzer,
    pub planner: Arc<Planner>,
    pub tags: Arc<TagManager>,
    pub forecaster: Arc<Predictor>,
    pub api_key: Option<String>,
}

/// Build the complete API router (REST + metrics).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route(
            "/metrics/{server_id}",
            get(handlers::get_metrics).post(handlers::ingest_metrics),
        )
        .route("/analysis/{server_id}", get(handlers::get_analysis))
        .route("/forecast/{server_id}", get(handlers::get_forecast))
        .route("/plans", get(handlers::list_plans))
        .route("/profiles", get(handlers::list_profiles))
        .route("/profiles/{service}", get(handlers::get_profile))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_api_key,
        ))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route(
            "/metrics",
            get(handlers::prometheus_metrics).with_state(state),
        )
        .route("/healthz", get(handlers::healthz))
        .layer(axum::middleware::from_fn(middleware::log_requests))
}
