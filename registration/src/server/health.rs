//! Health check endpoints.

use super::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use rollcall_runtime::{HealthCheck, HealthStatus};
use serde::Serialize;

/// Liveness response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"`
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
}

/// Liveness check. Does not touch dependencies.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"ok","version":"0.1.0"}
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check: ledger store health and a storage ping.
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthCheck>) {
    let health = state.registrations.readiness().await;
    let status = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(health))
}
