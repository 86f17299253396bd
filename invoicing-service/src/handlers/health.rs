use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;

use crate::services::get_metrics;
use crate::startup::AppState;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (status, success, message) = match state.repo.health_check().await {
        Ok(()) => (StatusCode::OK, true, "invoicing-service is healthy"),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                false,
                "invoicing-service database is unreachable",
            )
        }
    };

    (
        status,
        Json(json!({
            "success": success,
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

/// Prometheus metrics endpoint.
pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        get_metrics(),
    )
}
