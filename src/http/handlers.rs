//! Control-plane request handlers.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::health::HealthChecker;
use crate::http::response::{ApiResponse, HealthStatus};

/// Plain-text body returned when the management probe fails.
pub const PROBE_FAILURE_BODY: &str = "xray-api-unreachable";

/// State injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub checker: Arc<HealthChecker>,
}

/// `GET /`: healthy when the child's management endpoint accepts a connection.
pub async fn health(State(state): State<AppState>) -> Response {
    match state.checker.check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::ok("ok", HealthStatus::healthy_now())),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, PROBE_FAILURE_BODY).into_response()
        }
    }
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 page not found").into_response()
}
