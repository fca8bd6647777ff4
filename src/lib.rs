//! Model proxy - model-routing reverse proxy for LLM APIs
//!
//! Exposes one OpenAI-compatible surface over a pool of upstream endpoints.
//! Requests are routed by model name with per-model round-robin, shed by
//! fail-fast admission control, and relayed byte-for-byte, including event
//! streams.

pub mod admission;
pub mod config;
pub mod error;
pub mod proxy;
pub mod routes;
pub mod server;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

pub use crate::admission::{AdmissionController, AdmissionSlot};
pub use crate::config::Config;
pub use crate::error::ProxyError;
pub use crate::proxy::{ModelRegistry, RoundRobinRouter, UpstreamClient};
pub use crate::server::ProxyServer;

/// Application state shared across all request handlers.
///
/// Owns every piece of mutable proxy state, so separate instances (one per
/// test, for example) never interfere with each other.
pub struct AppState {
    pub config: Config,
    /// Normalized mount prefix, e.g. `/v1`
    pub api_prefix: String,
    pub registry: Arc<ModelRegistry>,
    pub router: RoundRobinRouter,
    pub admission: AdmissionController,
    pub start_time: Instant,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config) -> Result<Self> {
        let registry = Arc::new(
            ModelRegistry::build(&config.models, &config.http_client)
                .context("Failed to build model registry")?,
        );
        let router = RoundRobinRouter::new(registry.clone());
        let admission = AdmissionController::from_config(&config.limits);
        let api_prefix = config.server.normalized_prefix();

        Ok(Self {
            config,
            api_prefix,
            registry,
            router,
            admission,
            start_time: Instant::now(),
        })
    }
}
