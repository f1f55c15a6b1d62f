//! Handle to one live client connection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_core::Outbound;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Why a frame could not be queued for a peer.
#[derive(Debug, Error)]
pub enum SendError {
    /// The peer's outbound queue is full; the frame was dropped.
    #[error("outbound queue full")]
    Full,
    /// The peer is closing or its writer is gone.
    #[error("connection closed")]
    Closed,
    /// A relay-originated message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One physical client connection as seen by the registry and router.
///
/// Frames are submitted to a bounded queue drained by the socket's writer
/// task, so [`send`](Self::send) never suspends the caller.
pub struct PeerConnection {
    /// Unique connection ID.
    pub id: String,
    /// Send channel to the connection's writer task.
    tx: mpsc::Sender<String>,
    /// Cancelled when the transport should terminate.
    close: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded to the last ping.
    is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Frames dropped because the queue was full.
    dropped_messages: AtomicU64,
}

impl PeerConnection {
    /// Create a connection with a fresh ID.
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self::with_id(generate_id(), tx)
    }

    /// Create a connection with a caller-chosen ID.
    pub fn with_id(id: String, tx: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            close: CancellationToken::new(),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue a text frame.
    pub fn send(&self, text: String) -> Result<(), SendError> {
        if self.close.is_cancelled() {
            return Err(SendError::Closed);
        }
        match self.tx.try_send(text) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(SendError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Serialize and queue a relay-originated message.
    pub fn send_message(&self, message: &Outbound) -> Result<(), SendError> {
        self.send(message.to_json()?)
    }

    /// Ask the transport to terminate this connection. Idempotent.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.close.cancelled().await;
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closing(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Not closing and the writer task is still draining the queue.
    pub fn is_live(&self) -> bool {
        !self.close.is_cancelled() && !self.tx.is_closed()
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or data received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Fresh `conn_<uuid v7>` connection ID.
pub fn generate_id() -> String {
    format!("conn_{}", Uuid::now_v7())
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("id", &self.id)
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}
