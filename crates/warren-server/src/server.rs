//! Accept loop and graceful shutdown for the warren TCP server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use warren::{Jail, Session};

use crate::registry::ConnectionRegistry;

/// How long to wait for in-flight sessions to notice shutdown before the
/// process exits anyway.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Server configuration, immutable once the server is bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    pub addr: SocketAddr,
    /// Directory to serve; the jail root for every session.
    pub root: PathBuf,
    /// Welcome string sent on connect and for `INFO`.
    pub welcome: String,
}

/// The warren TCP server, prior to binding.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
}

impl Server {
    /// Create a server from configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Validate the jail root and bind the listening socket.
    pub async fn bind(self) -> anyhow::Result<BoundServer> {
        let jail = Jail::new(&self.config.root)
            .await
            .with_context(|| format!("invalid server root {}", self.config.root.display()))?;
        info!("Server root set to: {}", jail.root().display());
        let listener = TcpListener::bind(self.config.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.config.addr))?;
        info!("Listening on {}", listener.local_addr()?);
        Ok(BoundServer {
            listener,
            jail: Arc::new(jail),
            registry: Arc::new(ConnectionRegistry::new()),
            welcome: self.config.welcome,
        })
    }
}

/// A bound server ready to accept connections.
#[derive(Debug)]
pub struct BoundServer {
    listener: TcpListener,
    jail: Arc<Jail>,
    registry: Arc<ConnectionRegistry>,
    welcome: String,
}

impl BoundServer {
    /// The bound listening address (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The connection registry, shared with every session task.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until `shutdown` resolves, then stop accepting,
    /// broadcast shutdown to in-flight sessions, and wait for them to drain.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            // Accept failures are transient; keep listening.
                            warn!("accept failed: {err}");
                            continue;
                        }
                    };
                    info!(%peer, "connection accepted");
                    let guard = self.registry.register(peer);
                    let session = Session::new(
                        stream,
                        Arc::clone(&self.jail),
                        self.welcome.clone(),
                        self.registry.subscribe(),
                        peer.to_string(),
                    );
                    tokio::spawn(async move {
                        match session.run().await {
                            Ok(reason) => info!(%peer, ?reason, "session closed"),
                            Err(err) => warn!(%peer, "session I/O error: {err}"),
                        }
                        drop(guard);
                        info!(%peer, "connection closed");
                    });
                }
                _ = &mut shutdown => {
                    info!("shutdown requested, closing listener");
                    break;
                }
            }
        }
        drop(self.listener);
        self.registry.shutdown();
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while self.registry.active() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                "{} session(s) still open after {:?}, exiting anyway",
                self.registry.active(),
                DRAIN_TIMEOUT
            );
        }
        info!("server shut down");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {err}");
                // Fall through to let ctrl_c handle shutdown
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
