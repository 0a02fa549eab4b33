//! Live-connection registry with shutdown broadcast.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::warn;

/// Tracks live connections and broadcasts the shutdown request.
///
/// Registration is scoped: [`ConnectionRegistry::register`] returns a guard
/// that unregisters on drop, so a panicking or early-returning connection
/// task can never leak an entry.
#[derive(Debug)]
pub struct ConnectionRegistry {
    peers: Mutex<HashMap<u64, SocketAddr>>,
    next_id: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            peers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            shutdown_tx,
        }
    }

    /// Register a connection; the entry lives as long as the guard.
    pub fn register(self: &Arc<Self>, peer: SocketAddr) -> ConnectionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.peers.lock() {
            Ok(mut peers) => {
                peers.insert(id, peer);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(id, peer);
            }
        }
        ConnectionGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    /// A shutdown receiver for one session; fires when [`ConnectionRegistry::shutdown`]
    /// is called.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Request termination of every registered session.
    pub fn shutdown(&self) {
        if self.shutdown_tx.send(true).is_err() {
            warn!("shutdown requested with no live sessions to notify");
        }
    }

    /// Number of currently registered connections.
    pub fn active(&self) -> usize {
        match self.peers.lock() {
            Ok(peers) => peers.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn unregister(&self, id: u64) {
        match self.peers.lock() {
            Ok(mut peers) => {
                peers.remove(&id);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&id);
            }
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped registration of one connection; unregisters on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    id: u64,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
