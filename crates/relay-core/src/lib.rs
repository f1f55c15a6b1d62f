//! # relay-core
//!
//! Shared building blocks for the signaling relay.
//!
//! - [`protocol`]: the JSON message schema exchanged with clients, parsed
//!   explicitly into [`protocol::Inbound`] and built as [`protocol::Outbound`]
//! - [`errors`]: [`ProtocolError`] for payloads that cannot be routed
//! - [`logging`]: `tracing` subscriber setup used by the binary

#![deny(unsafe_code)]

pub mod errors;
pub mod logging;
pub mod protocol;

pub use errors::{ProtocolError, Result};
pub use protocol::{Inbound, OWNER_IDENTITY, Outbound, Role, SignalKind, parse_inbound};
