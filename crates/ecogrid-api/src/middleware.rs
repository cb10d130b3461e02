//! Request logging and API-key authentication layers.

use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::info;

use crate::ApiState;

/// Log every request with its method, path, status, and duration.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    info!(
        %method,
        %uri,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request handled"
    );
    response
}

/// Reject requests without a matching `X-API-Key` header. A daemon
/// configured without a key accepts everything.
pub async fn require_api_key(
    State(state): State<ApiState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.api_key else {
        return next.run(req).await;
    };

    let presented = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());
    match presented {
        Some(key) if key == expected => next.run(req).await,
        Some(_) => {
            crate::handlers::error_response("invalid API key", StatusCode::UNAUTHORIZED)
                .into_response()
        }
        None => crate::handlers::error_response("no API key provided", StatusCode::UNAUTHORIZED)
            .into_response(),
    }
}
