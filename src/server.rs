//! Server shell
//!
//! Owns the listening socket and drives one hyper connection task per
//! accepted client. On shutdown it stops accepting, asks every open
//! connection to finish its in-flight requests, and waits for them at most
//! the configured grace period.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::conn::auto::Builder,
    service::TowerToHyperService,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;

/// Bound listener plus the application it serves
pub struct ProxyServer {
    listener: TcpListener,
    app: Router,
    idle_timeout: Option<Duration>,
    shutdown_grace: Duration,
}

impl ProxyServer {
    /// Bind the configured address
    pub async fn bind(config: &ServerConfig, app: Router) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        Ok(Self {
            listener,
            app,
            idle_timeout: config.idle_timeout(),
            shutdown_grace: config.shutdown_grace(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` resolves, then drain within the grace period
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Self {
            listener,
            app,
            idle_timeout,
            shutdown_grace,
        } = self;

        // Broadcasts the drain request to connection tasks
        let (signal_tx, signal_rx) = watch::channel(());
        // Every connection task holds a receiver; all dropped means drained
        let (close_tx, close_rx) = watch::channel(());

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            continue;
                        }
                    };

                    tokio::spawn(serve_connection(
                        stream,
                        peer,
                        app.clone(),
                        idle_timeout,
                        signal_rx.clone(),
                        close_rx.clone(),
                    ));
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        drop(listener);
        drop(signal_rx);
        drop(close_rx);
        let _ = signal_tx.send(());

        tokio::select! {
            _ = close_tx.closed() => {
                info!("All connections drained");
            }
            _ = tokio::time::sleep(shutdown_grace) => {
                warn!(
                    grace_seconds = shutdown_grace.as_secs(),
                    open_connections = close_tx.receiver_count(),
                    "Grace period elapsed, abandoning open connections"
                );
            }
        }

        Ok(())
    }
}

fn connection_builder(idle_timeout: Option<Duration>) -> Builder<TokioExecutor> {
    let mut builder = Builder::new(TokioExecutor::new());
    builder.http1().timer(TokioTimer::new()).keep_alive(true);
    if let Some(idle) = idle_timeout {
        // Covers both a slow request head and an idle keep-alive connection
        builder.http1().header_read_timeout(idle);
    }
    builder
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    idle_timeout: Option<Duration>,
    mut signal_rx: watch::Receiver<()>,
    close_rx: watch::Receiver<()>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
    }

    let builder = connection_builder(idle_timeout);
    let service = TowerToHyperService::new(app);
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    debug!(peer = %peer, error = %e, "Connection closed with error");
                }
                break;
            }
            _ = signal_rx.changed(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }

    drop(close_rx);
}
