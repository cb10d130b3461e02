//! REST API handlers.
//!
//! Each handler reads through the shared components and returns JSON
//! responses in a consistent envelope.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use ecogrid_forecast::ForecastError;
use ecogrid_score::ScoreError;
use ecogrid_store::{Sample, StoreError};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Metrics ────────────────────────────────────────────────────

/// POST /api/v1/metrics/:server_id
///
/// Enqueues a batch of samples. Returns 202 on acceptance; 503 when the
/// ingestion buffer is full, so producers know to back off.
pub async fn ingest_metrics(
    State(state): State<ApiState>,
    Path(server_id): Path<String>,
    Json(mut samples): Json<Vec<Sample>>,
) -> impl IntoResponse {
    // The path owns the identity; bodies need not repeat it.
    for sample in &mut samples {
        sample.server_id = server_id.clone();
    }
    let accepted = samples.len();
    match state.store.ingest_batch(server_id, samples) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            ApiResponse::ok(serde_json::json!({ "accepted": accepted })),
        )
            .into_response(),
        Err(e @ StoreError::BufferFull) | Err(e @ StoreError::Closed) => {
            error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/metrics/:server_id
pub async fn get_metrics(
    State(state): State<ApiState>,
    Path(server_id): Path<String>,
) -> impl IntoResponse {
    match state.store.query(&server_id).await {
        Ok(samples) => ApiResponse::ok(samples).into_response(),
        Err(e @ StoreError::NotFound(_)) => {
            error_response(&e.to_string(), StatusCode::NOT_FOUND).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Analysis ───────────────────────────────────────────────────

/// GET /api/v1/analysis/:server_id
pub async fn get_analysis(
    State(state): State<ApiState>,
    Path(server_id): Path<String>,
) -> impl IntoResponse {
    let samples = match state.store.query(&server_id).await {
        Ok(samples) => samples,
        Err(e @ StoreError::NotFound(_)) => {
            return error_response(&e.to_string(), StatusCode::NOT_FOUND).into_response();
        }
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };
    match state.analyzer.analyze(&samples) {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e @ ScoreError::InsufficientData { .. }) => {
            error_response(&e.to_string(), StatusCode::UNPROCESSABLE_ENTITY).into_response()
        }
    }
}

// ── Forecast ───────────────────────────────────────────────────

/// Query parameters for the forecast endpoint.
#[derive(serde::Deserialize)]
pub struct ForecastQuery {
    #[serde(default = "default_horizon")]
    pub horizon_secs: u64,
}

fn default_horizon() -> u64 {
    3600
}

/// GET /api/v1/forecast/:server_id?horizon_secs=N
pub async fn get_forecast(
    State(state): State<ApiState>,
    Path(server_id): Path<String>,
    Query(query): Query<ForecastQuery>,
) -> impl IntoResponse {
    match state.forecaster.forecast(&server_id, query.horizon_secs).await {
        Ok(forecast) => ApiResponse::ok(forecast).into_response(),
        Err(e @ ForecastError::ModelNotFound(_)) => {
            error_response(&e.to_string(), StatusCode::NOT_FOUND).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::UNPROCESSABLE_ENTITY).into_response(),
    }
}

// ── Plans ──────────────────────────────────────────────────────

/// GET /api/v1/plans
pub async fn list_plans(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.planner.active_plans().await)
}

// ── Profiles ───────────────────────────────────────────────────

/// GET /api/v1/profiles
pub async fn list_profiles(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.tags.all_profiles().await)
}

/// GET /api/v1/profiles/:service
pub async fn get_profile(
    State(state): State<ApiState>,
    Path(service): Path<String>,
) -> impl IntoResponse {
    match state.tags.profile(&service).await {
        Ok(profile) => ApiResponse::ok(profile).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::NOT_FOUND).into_response(),
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    // Latest sample per tracked server.
    let mut latest = Vec::new();
    for server_id in state.store.tracked_servers().await {
        if let Ok(samples) = state.store.query(&server_id).await
            && let Some(last) = samples.last()
        {
            // The store key owns the identity, as on ingest.
            let mut last = last.clone();
            last.server_id = server_id;
            latest.push(last);
        }
    }
    latest.sort_by(|a, b| a.server_id.cmp(&b.server_id));

    let body = crate::prometheus::render_prometheus(&latest);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

// ── Health ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok(serde_json::json!({ "status": "ok" }))
}
