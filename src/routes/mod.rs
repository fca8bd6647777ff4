//! HTTP routes for the model proxy
//!
//! This module defines all HTTP endpoints exposed by the proxy.

pub mod dispatch;
pub mod health;
pub mod metrics;
pub mod models;

use std::sync::Arc;

use axum::{
    routing::{any, get},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::{RequestBodyTimeoutLayer, TimeoutLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Router holding only the catch-all proxy handler under the API prefix.
///
/// This is the piece an outer application mounts; it carries the read and
/// write bounds from the server configuration.
pub fn proxy_routes(state: Arc<AppState>) -> Router {
    let route = format!("{}/*path", state.api_prefix);
    let server = &state.config.server;

    let mut router = Router::new().route(&route, any(dispatch::proxy_handler));

    if let Some(timeout) = server.write_timeout() {
        router = router.layer(TimeoutLayer::new(timeout));
    }
    if let Some(timeout) = server.read_timeout() {
        router = router.layer(RequestBodyTimeoutLayer::new(timeout));
    }

    router.with_state(state)
}

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (health checks, metrics)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(metrics::prometheus_metrics))
        .with_state(state.clone());

    Router::new()
        .merge(public_routes)
        .merge(proxy_routes(state))
        // Global middleware (applied to all routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
