//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use relay_core::OWNER_IDENTITY;

use crate::registry::ConnectionRegistry;

/// Coordinates graceful shutdown across the listener and every session task.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tracker that session tasks are spawned on.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop the relay.
    ///
    /// 1. Close the owner's connection, then every other registered one
    /// 2. Cancel the shutdown token (stops the listener and unregistered sessions)
    /// 3. Wait up to `timeout` for session tasks to finish
    /// 4. Clear whatever is left in the registry
    ///
    /// The owner goes first so user sessions ending during shutdown find no
    /// live owner to notify.
    pub async fn graceful_shutdown(&self, registry: &ConnectionRegistry, timeout: Duration) {
        if let Some(owner) = registry.get(OWNER_IDENTITY) {
            owner.connection.close();
        }
        let entries = registry.entries();
        for entry in &entries {
            entry.connection.close();
        }
        self.shutdown();
        let _ = self.tracker.close();
        info!(
            registered = entries.len(),
            sessions = self.tracker.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for sessions to close"
        );

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(
                remaining = self.tracker.len(),
                "shutdown timed out after {timeout:?}, some sessions may still be running"
            );
        }
        registry.clear();
        info!("shutdown complete");
    }
}
