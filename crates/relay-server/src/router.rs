//! Per-connection signaling state machine.
//!
//! One [`SignalingRouter`] is created for every accepted connection. It tracks
//! the identity and role the connection registered under and moves through
//! `Unregistered → Registered → Closed`. Payloads are never interpreted beyond
//! their addressing fields: pass-through messages are forwarded as the exact
//! text that arrived.
//!
//! No failure here is reported to the sender. Malformed input, unknown types
//! and unresolved targets are logged and the single message is dropped.

use std::sync::Arc;

use metrics::counter;
use relay_core::{
    Inbound, OWNER_IDENTITY, Outbound, ProtocolError, Role, SignalKind, parse_inbound,
};
use tracing::{debug, info, warn};

use crate::metrics as names;
use crate::registry::{ConnectionRegistry, Release};
use crate::websocket::connection::{PeerConnection, SendError};

/// Lifecycle phase of a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    /// No `register` has been processed yet.
    #[default]
    Unregistered,
    /// At least one `register` has been processed.
    Registered,
    /// Teardown has run; nothing further is processed.
    Closed,
}

/// What the router learned about its own connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionState {
    /// Identity from the latest `register`.
    pub identity: Option<String>,
    /// Role from the latest `register`.
    pub role: Option<Role>,
    /// Lifecycle phase.
    pub phase: Phase,
}

/// Why a connection is being torn down.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectCause {
    /// The client closed the socket or the stream ended.
    Closed,
    /// The transport reported an error.
    TransportError(String),
    /// Another client evicted this identity with `removeUser`.
    Evicted,
    /// The server is shutting down.
    Shutdown,
    /// The client stopped answering pings.
    HeartbeatTimeout,
}

impl DisconnectCause {
    /// Short, stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::TransportError(_) => "transport_error",
            Self::Evicted => "evicted",
            Self::Shutdown => "shutdown",
            Self::HeartbeatTimeout => "heartbeat_timeout",
        }
    }
}

/// Outcome of handling one inbound message.
#[derive(Debug)]
pub enum Dispatch {
    /// `register` succeeded.
    Registered {
        /// Registered identity.
        identity: String,
        /// Registered role.
        role: Role,
        /// Whether the owner (or, for an owner, this connection) was sent a notification.
        notified: bool,
    },
    /// `removeUser` closed and removed an identity.
    Evicted {
        /// The evicted identity.
        identity: String,
    },
    /// `removeUser` named an identity that is not registered.
    EvictMissed {
        /// The requested identity.
        identity: String,
    },
    /// A pass-through message was queued for its target.
    Forwarded {
        /// Message type.
        kind: SignalKind,
        /// Recipient identity.
        target: String,
    },
    /// A pass-through message could not be delivered.
    TargetMissing {
        /// Message type.
        kind: SignalKind,
        /// Recipient identity.
        target: String,
    },
    /// The `type` is not one the relay handles.
    Unknown {
        /// The unrecognized `type`.
        kind: String,
    },
    /// The payload could not be parsed.
    Malformed(ProtocolError),
    /// The connection has already been torn down.
    Ignored,
}

/// Routes messages for a single connection.
pub struct SignalingRouter {
    registry: Arc<ConnectionRegistry>,
    connection: Arc<PeerConnection>,
    state: ConnectionState,
}

impl SignalingRouter {
    /// Create a router for a freshly accepted connection.
    pub fn new(registry: Arc<ConnectionRegistry>, connection: Arc<PeerConnection>) -> Self {
        Self {
            registry,
            connection,
            state: ConnectionState::default(),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// The connection this router serves.
    pub fn connection(&self) -> &Arc<PeerConnection> {
        &self.connection
    }

    /// Handle one inbound text message.
    pub fn handle_text(&mut self, raw: &str) -> Dispatch {
        if self.state.phase == Phase::Closed {
            return Dispatch::Ignored;
        }

        let message = match parse_inbound(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    conn_id = %self.connection.id,
                    reason = e.label(),
                    error = %e,
                    "dropping malformed message"
                );
                counter!(names::MESSAGES_DROPPED_TOTAL, "reason" => e.label()).increment(1);
                return Dispatch::Malformed(e);
            }
        };
        debug!(conn_id = %self.connection.id, kind = message.kind(), "message received");
        counter!(names::MESSAGES_RECEIVED_TOTAL, "type" => message.metric_label()).increment(1);

        match message {
            Inbound::Register { user_id, role } => self.register(user_id, role),
            Inbound::RemoveUser { user_id } => self.evict(user_id),
            Inbound::Signal { kind, target } => self.forward(kind, target, raw),
            Inbound::Unknown { kind } => {
                info!(conn_id = %self.connection.id, kind, "unknown message type");
                counter!(names::MESSAGES_DROPPED_TOTAL, "reason" => "unknown_type").increment(1);
                Dispatch::Unknown { kind }
            }
        }
    }

    /// Tear the connection down. Runs at most once; later calls return `false`.
    pub fn handle_disconnect(&mut self, cause: &DisconnectCause) -> bool {
        if self.state.phase == Phase::Closed {
            return false;
        }
        self.state.phase = Phase::Closed;

        match self.state.identity.take() {
            Some(identity) => {
                info!(
                    conn_id = %self.connection.id,
                    identity,
                    cause = cause.label(),
                    "client disconnected"
                );
                self.release(&identity);
            }
            None => {
                info!(
                    conn_id = %self.connection.id,
                    cause = cause.label(),
                    "unregistered client disconnected"
                );
            }
        }
        true
    }

    fn register(&mut self, identity: String, role: Role) -> Dispatch {
        if let Some(previous) = self.state.identity.take() {
            if previous != identity {
                debug!(
                    conn_id = %self.connection.id,
                    previous,
                    identity,
                    "connection re-registering under a new identity"
                );
                self.release(&previous);
            }
        }

        self.state.identity = Some(identity.clone());
        self.state.role = Some(role);
        self.state.phase = Phase::Registered;

        if let Some(displaced) = self.registry.put(&identity, role, self.connection.clone()) {
            if displaced.connection.id != self.connection.id {
                info!(
                    identity,
                    displaced_conn = %displaced.connection.id,
                    "identity taken over by new connection"
                );
            }
        }
        info!(conn_id = %self.connection.id, identity, %role, "user registered");
        set_registered_gauge(&self.registry);

        let notified = match role {
            Role::Owner => {
                let users = self.registry.list_identities_except(&[OWNER_IDENTITY]);
                debug!(identity, users = users.len(), "sending roster to owner");
                deliver(&self.connection, &Outbound::Users { users })
            }
            Role::User => self.notify_owner(Outbound::UserConnected {
                user_id: identity.clone(),
            }),
        };

        Dispatch::Registered {
            identity,
            role,
            notified,
        }
    }

    fn evict(&self, identity: String) -> Dispatch {
        let Some(entry) = self.registry.get(&identity) else {
            info!(conn_id = %self.connection.id, identity, "removeUser: identity not registered");
            return Dispatch::EvictMissed { identity };
        };

        entry.connection.close();
        // The evicted connection may already have been replaced by a newer one
        let _ = self.registry.release(&identity, &entry.connection.id);
        set_registered_gauge(&self.registry);
        info!(conn_id = %self.connection.id, identity, "user removed");
        counter!(names::EVICTIONS_TOTAL).increment(1);
        Dispatch::Evicted { identity }
    }

    fn forward(&self, kind: SignalKind, target: String, raw: &str) -> Dispatch {
        let Some(entry) = self.registry.get(&target) else {
            info!(conn_id = %self.connection.id, %kind, target, "target not found");
            counter!(names::MESSAGES_DROPPED_TOTAL, "reason" => "target_missing").increment(1);
            return Dispatch::TargetMissing { kind, target };
        };

        match entry.connection.send(raw.to_owned()) {
            Ok(()) => {
                debug!(conn_id = %self.connection.id, %kind, target, "forwarded");
                counter!(names::MESSAGES_FORWARDED_TOTAL, "type" => kind.as_str()).increment(1);
                Dispatch::Forwarded { kind, target }
            }
            Err(e) => {
                warn!(
                    conn_id = %self.connection.id,
                    %kind,
                    target,
                    error = %e,
                    "failed to forward"
                );
                counter!(names::SEND_FAILURES_TOTAL).increment(1);
                Dispatch::TargetMissing { kind, target }
            }
        }
    }

    /// Drop `identity` from the registry if this connection still holds it and
    /// tell the owner it left.
    fn release(&self, identity: &str) {
        match self.registry.release(identity, &self.connection.id) {
            Release::Removed(_) | Release::Absent => {
                set_registered_gauge(&self.registry);
                if identity != OWNER_IDENTITY {
                    let _ = self.notify_owner(Outbound::UserDisconnected {
                        user_id: identity.to_owned(),
                    });
                }
            }
            Release::Superseded => {
                debug!(
                    conn_id = %self.connection.id,
                    identity,
                    "identity held by a newer connection, leaving it"
                );
            }
        }
    }

    /// Send `message` to the owner if one is registered and live.
    fn notify_owner(&self, message: Outbound) -> bool {
        match self.registry.get(OWNER_IDENTITY) {
            Some(owner) if owner.connection.is_live() => deliver(&owner.connection, &message),
            Some(_) => {
                debug!(kind = message.kind(), "owner connection is closing, skipping notification");
                false
            }
            None => {
                debug!(kind = message.kind(), "no owner registered, skipping notification");
                false
            }
        }
    }
}

fn deliver(connection: &PeerConnection, message: &Outbound) -> bool {
    match connection.send_message(message) {
        Ok(()) => true,
        Err(e) => {
            if matches!(e, SendError::Full) {
                counter!(names::MESSAGES_DROPPED_TOTAL, "reason" => "queue_full").increment(1);
            }
            warn!(
                conn_id = %connection.id,
                kind = message.kind(),
                error = %e,
                "failed to deliver relay message"
            );
            counter!(names::SEND_FAILURES_TOTAL).increment(1);
            false
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn set_registered_gauge(registry: &ConnectionRegistry) {
    metrics::gauge!(names::REGISTERED_IDENTITIES).set(registry.len() as f64);
}
