//! relayhub server orchestration
//!
//! Runs the HTTP control plane until it stops or a shutdown signal arrives,
//! then closes every room ingress and viewer connection.

use relayhub_sfu::Registry;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::Config;
use crate::http;

pub struct RelayServer {
    config: Config,
    registry: Arc<Registry>,
}

impl RelayServer {
    #[must_use]
    pub fn new(config: Config, registry: Arc<Registry>) -> Self {
        Self { config, registry }
    }

    /// Start all servers and wait for shutdown signal
    pub async fn run(self) -> anyhow::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let http_addr: std::net::SocketAddr = self
            .config
            .http_address()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid HTTP address '{}': {e}", self.config.http_address()))?;
        let listener = tokio::net::TcpListener::bind(http_addr).await?;
        info!("HTTP server listening on {}", http_addr);

        let router = http::create_router(Arc::clone(&self.registry), &self.config.server.static_dir);
        let mut http_handle = tokio::spawn(async move {
            let mut rx = shutdown_rx;
            let graceful = async move {
                let _ = rx.changed().await;
            };

            if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(graceful).await {
                error!("HTTP server error: {}", e);
            }

            info!("HTTP server shut down gracefully");
        });

        tokio::select! {
            _ = &mut http_handle => {
                error!("HTTP server stopped unexpectedly");
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, starting graceful shutdown...");
            }
        }

        let _ = shutdown_tx.send(true);
        if !http_handle.is_finished() {
            let _ = http_handle.await;
        }

        self.registry.shutdown().await;
        info!("relayhub shut down complete");

        Ok(())
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
