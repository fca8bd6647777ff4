//! Model proxy - model-routing reverse proxy for LLM APIs
//!
//! This is the main entry point for the proxy server.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use model_proxy::{routes, AppState, Config, ProxyServer};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting model proxy");

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;
    info!(
        models = config.models.len(),
        prefix = %config.server.normalized_prefix(),
        "Configuration loaded successfully"
    );

    // Initialize metrics
    routes::metrics::init_metrics()?;
    info!("Metrics initialized");

    // Initialize application state
    let state = Arc::new(AppState::new(config.clone())?);
    if state.registry.is_empty() {
        warn!("No model has a usable endpoint; every proxied request will be rejected");
    }

    // Build the router
    let app = routes::create_router(state);

    // Bind and serve with graceful shutdown
    let server = ProxyServer::bind(&config.server, app).await?;
    info!("Listening on {}", server.local_addr()?);

    server.serve(shutdown_signal()).await?;

    info!("Model proxy shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "model_proxy=info,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    }
}

/// Handle graceful shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating shutdown");
        }
    }
}
