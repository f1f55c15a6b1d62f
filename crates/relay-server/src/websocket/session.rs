//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::PeerConnection;
use crate::metrics as names;
use crate::registry::ConnectionRegistry;
use crate::router::{DisconnectCause, SignalingRouter};

/// How long the writer gets to flush a close frame after the reader stops.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Shared inputs for every session.
#[derive(Clone, Debug)]
pub struct SessionContext {
    /// The identity → connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Server-wide shutdown signal.
    pub shutdown: CancellationToken,
    /// Outbound queue capacity per connection.
    pub send_queue_capacity: usize,
    /// Interval between server-initiated Ping frames.
    pub heartbeat_interval: Duration,
    /// Silence after which the client is considered dead.
    pub heartbeat_timeout: Duration,
}

/// Why the writer task stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WriterExit {
    /// The connection was asked to close.
    Closed,
    /// No pong within the heartbeat timeout.
    HeartbeatTimeout,
    /// The socket rejected a frame.
    SendFailed,
}

/// Run a WebSocket session for a connected client.
///
/// 1. Registers nothing until the client sends `register`
/// 2. Routes inbound text (and UTF-8 binary) frames through a [`SignalingRouter`]
/// 3. Drains the connection's outbound queue and sends periodic Ping frames
/// 4. Ends on client close, transport error, eviction, heartbeat timeout or shutdown
/// 5. Runs disconnect cleanup exactly once
#[instrument(skip_all, fields(conn_id = %conn_id))]
pub async fn run_session(ws: WebSocket, conn_id: String, ctx: SessionContext) {
    let (ws_tx, mut ws_rx) = ws.split();

    let (send_tx, send_rx) = mpsc::channel::<String>(ctx.send_queue_capacity.max(1));
    let connection = Arc::new(PeerConnection::with_id(conn_id, send_tx));
    let mut router = SignalingRouter::new(ctx.registry.clone(), connection.clone());

    let connection_start = Instant::now();
    info!("client connected");
    counter!(names::WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(names::WS_CONNECTIONS_ACTIVE).increment(1.0);

    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        send_rx,
        connection.clone(),
        ctx.heartbeat_interval,
        ctx.heartbeat_timeout,
    ));

    let cause = loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => break DisconnectCause::TransportError(e.to_string()),
                    None => break DisconnectCause::Closed,
                };
                connection.mark_alive();

                let text = match msg {
                    Message::Text(ref t) => Some(t.as_str()),
                    Message::Binary(ref data) => {
                        let text = std::str::from_utf8(data).ok();
                        if text.is_none() {
                            info!(len = data.len(), "ignoring non-UTF8 binary frame");
                        }
                        text
                    }
                    Message::Close(_) => {
                        debug!("client sent close frame");
                        break DisconnectCause::Closed;
                    }
                    Message::Ping(_) | Message::Pong(_) => None,
                };

                if let Some(text) = text {
                    let outcome = router.handle_text(text);
                    debug!(?outcome, "message handled");
                }
            }
            () = connection.closed() => {
                break if ctx.shutdown.is_cancelled() {
                    DisconnectCause::Shutdown
                } else {
                    DisconnectCause::Evicted
                };
            }
            () = ctx.shutdown.cancelled() => break DisconnectCause::Shutdown,
            exit = &mut writer => {
                break match exit {
                    Ok(WriterExit::HeartbeatTimeout) => DisconnectCause::HeartbeatTimeout,
                    Ok(WriterExit::Closed) => DisconnectCause::Closed,
                    Ok(WriterExit::SendFailed) => {
                        DisconnectCause::TransportError("send failed".into())
                    }
                    Err(e) => DisconnectCause::TransportError(e.to_string()),
                };
            }
        }
    };

    let _ = router.handle_disconnect(&cause);

    // Let the writer send its close frame, then make sure it is gone
    connection.close();
    if !writer.is_finished() && tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }

    info!(cause = cause.label(), dropped = connection.drop_count(), "client session ended");
    counter!(names::WS_DISCONNECTIONS_TOTAL, "cause" => cause.label()).increment(1);
    gauge!(names::WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(names::WS_CONNECTION_DURATION_SECONDS)
        .record(connection_start.elapsed().as_secs_f64());
}

/// Drain the outbound queue into the socket, send Ping frames, and close
/// the socket when the connection is asked to close.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<String>,
    connection: Arc<PeerConnection>,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
) -> WriterExit {
    // A zero period panics in tokio
    let period = heartbeat_interval.max(Duration::from_millis(1));
    let mut ping_interval = tokio::time::interval(period);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            biased;

            msg = send_rx.recv() => {
                let Some(text) = msg else { return WriterExit::Closed };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    return WriterExit::SendFailed;
                }
            }
            () = connection.closed() => {
                let frame = CloseFrame {
                    code: close_code::NORMAL,
                    reason: Utf8Bytes::from_static(""),
                };
                let _ = ws_tx.send(Message::Close(Some(frame))).await;
                let _ = ws_tx.close().await;
                return WriterExit::Closed;
            }
            _ = ping_interval.tick() => {
                if !connection.check_alive() && connection.last_pong_elapsed() > heartbeat_timeout {
                    warn!(timeout = ?heartbeat_timeout, "client unresponsive, disconnecting");
                    return WriterExit::HeartbeatTimeout;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return WriterExit::SendFailed;
                }
            }
        }
    }
}
