//! Signaling wire protocol.
//!
//! Every message is a UTF-8 JSON object with a mandatory `type` field. The
//! relay only looks at the addressing fields (`userId`, `role`, `target`);
//! everything else in a pass-through message is opaque and is forwarded as the
//! original text, never re-serialized.
//!
//! | type | fields | direction |
//! |------|--------|-----------|
//! | `register` | `userId`, `role` (optional, default `user`) | client → relay |
//! | `users` | `users` | relay → owner |
//! | `userConnected` | `userId` | relay → owner |
//! | `userDisconnected` | `userId` | relay → owner |
//! | `removeUser` | `userId` | client → relay |
//! | pass-through ([`SignalKind`]) | `target` + opaque payload | client → relay → target |

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ProtocolError, Result};

/// The reserved identity of the single privileged peer.
pub const OWNER_IDENTITY: &str = "owner";

/// Role claimed by a connection at registration time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Receives the roster and connect/disconnect notifications.
    Owner,
    /// Any other participant.
    #[default]
    User,
}

impl Role {
    /// Map a raw `role` value. Anything other than the string `"owner"` is a user.
    pub fn from_claim(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("owner") => Self::Owner,
            _ => Self::User,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message types forwarded verbatim to the peer named by `target`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// `call`
    Call,
    /// `callAccepted`
    CallAccepted,
    /// `callRejected`
    CallRejected,
    /// `ice-candidate`
    IceCandidate,
    /// `offer`
    Offer,
    /// `answer`
    Answer,
    /// `endCall`
    EndCall,
}

impl SignalKind {
    /// Every pass-through kind.
    pub const ALL: [Self; 7] = [
        Self::Call,
        Self::CallAccepted,
        Self::CallRejected,
        Self::IceCandidate,
        Self::Offer,
        Self::Answer,
        Self::EndCall,
    ];

    /// Look up a pass-through kind by its `type` value.
    pub fn from_wire(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::CallAccepted => "callAccepted",
            Self::CallRejected => "callRejected",
            Self::IceCandidate => "ice-candidate",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::EndCall => "endCall",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed client message, reduced to what routing needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// `register`: claim an identity on this connection.
    Register {
        /// Claimed identity.
        user_id: String,
        /// Claimed role (defaults to [`Role::User`]).
        role: Role,
    },
    /// `removeUser`: evict an identity and close its connection.
    RemoveUser {
        /// Identity to evict.
        user_id: String,
    },
    /// A pass-through message addressed to `target`.
    Signal {
        /// Message type.
        kind: SignalKind,
        /// Recipient identity.
        target: String,
    },
    /// Any other `type` value.
    Unknown {
        /// The unrecognized `type`.
        kind: String,
    },
}

impl Inbound {
    /// The `type` value this message was parsed from.
    pub fn kind(&self) -> &str {
        match self {
            Self::Register { .. } => "register",
            Self::RemoveUser { .. } => "removeUser",
            Self::Signal { kind, .. } => kind.as_str(),
            Self::Unknown { kind } => kind,
        }
    }

    /// Bounded label for metrics; unknown types collapse to `"unknown"`.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::RemoveUser { .. } => "removeUser",
            Self::Signal { kind, .. } => kind.as_str(),
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// Parse a raw text frame.
///
/// Only the addressing fields are extracted. Callers keep `raw` for
/// forwarding.
pub fn parse_inbound(raw: &str) -> Result<Inbound> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(fields) = value else {
        return Err(ProtocolError::NotAnObject);
    };
    let kind = fields
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;

    match kind {
        "register" => Ok(Inbound::Register {
            user_id: required_str(&fields, kind, "userId")?,
            role: Role::from_claim(fields.get("role")),
        }),
        "removeUser" => Ok(Inbound::RemoveUser {
            user_id: required_str(&fields, kind, "userId")?,
        }),
        other => match SignalKind::from_wire(other) {
            Some(signal) => Ok(Inbound::Signal {
                kind: signal,
                target: required_str(&fields, kind, "target")?,
            }),
            None => Ok(Inbound::Unknown {
                kind: other.to_owned(),
            }),
        },
    }
}

fn required_str(fields: &Map<String, Value>, kind: &str, field: &'static str) -> Result<String> {
    fields
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ProtocolError::MissingField {
            kind: kind.to_owned(),
            field,
        })
}

/// Messages originated by the relay itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    /// Roster sent to the owner when it registers.
    Users {
        /// Registered identities other than the owner.
        users: Vec<String>,
    },
    /// A non-owner identity registered.
    UserConnected {
        /// The new identity.
        #[serde(rename = "userId")]
        user_id: String,
    },
    /// A non-owner identity went away.
    UserDisconnected {
        /// The departed identity.
        #[serde(rename = "userId")]
        user_id: String,
    },
}

impl Outbound {
    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// The `type` value of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Users { .. } => "users",
            Self::UserConnected { .. } => "userConnected",
            Self::UserDisconnected { .. } => "userDisconnected",
        }
    }
}
