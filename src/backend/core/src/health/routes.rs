//! Health check HTTP routes.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use super::{HealthService, LivenessResponse, ReadinessResponse};

fn status_code(operational: bool) -> StatusCode {
    if operational {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health - component report
pub async fn health_check(State(service): State<Arc<HealthService>>) -> impl IntoResponse {
    let report = service.check_health().await;
    (status_code(report.status.is_operational()), Json(report))
}

/// GET /health/ready
pub async fn readiness_check(State(service): State<Arc<HealthService>>) -> impl IntoResponse {
    let report = service.check_health().await;
    let response = ReadinessResponse::from(&report);
    (status_code(response.ready), Json(response))
}

/// GET /health/live
pub async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(LivenessResponse::alive()))
}
