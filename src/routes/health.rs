//! Health check endpoints
//!
//! Provides endpoints for monitoring and container orchestration:
//! - `/health` - Full health check with registry and admission status
//! - `/health/ready` - Readiness probe
//! - `/health/live` - Liveness probe

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

/// Health status enum
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Headroom of one admission pool
#[derive(Debug, Serialize)]
pub struct PoolStatus {
    pub capacity: usize,
    pub available: usize,
}

/// Admission headroom for both pools
#[derive(Debug, Serialize)]
pub struct AdmissionStatus {
    pub non_stream: PoolStatus,
    pub stream: PoolStatus,
}

/// Full health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: String,
    pub models: usize,
    pub admission: AdmissionStatus,
}

/// Simple health response for liveness/readiness
#[derive(Debug, Serialize)]
pub struct SimpleHealthResponse {
    pub status: HealthStatus,
}

fn pool_status(state: &AppState, streaming: bool) -> PoolStatus {
    PoolStatus {
        capacity: state.admission.capacity(streaming),
        available: state.admission.available(streaming),
    }
}

/// Full health check endpoint
///
/// A proxy with no routable model is reported unhealthy; one with an
/// exhausted admission pool is degraded.
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let admission = AdmissionStatus {
        non_stream: pool_status(&state, false),
        stream: pool_status(&state, true),
    };

    let status = if state.registry.is_empty() {
        HealthStatus::Unhealthy
    } else if admission.non_stream.available == 0 || admission.stream.available == 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    let http_status = if status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        models: state.registry.len(),
        admission,
    };

    (http_status, Json(response))
}

/// Readiness probe: ready once at least one model is routable
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<SimpleHealthResponse>) {
    if state.registry.is_empty() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SimpleHealthResponse {
                status: HealthStatus::Unhealthy,
            }),
        )
    } else {
        (
            StatusCode::OK,
            Json(SimpleHealthResponse {
                status: HealthStatus::Healthy,
            }),
        )
    }
}

/// Liveness probe
pub async fn liveness_check() -> (StatusCode, Json<SimpleHealthResponse>) {
    (
        StatusCode::OK,
        Json(SimpleHealthResponse {
            status: HealthStatus::Healthy,
        }),
    )
}
