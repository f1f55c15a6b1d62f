//! # relay-server
//!
//! Connection registry, signaling router and the Axum `WebSocket` server that
//! hosts them.
//!
//! - [`registry`]: shared identity → connection map (the only shared mutable state)
//! - [`router`]: per-connection state machine that dispatches signaling messages
//! - [`websocket`]: connection handle and the socket session loop
//! - [`server`]: HTTP routes (`/ws`, `/health`, `/metrics`) and listener
//! - [`shutdown`]: `CancellationToken` + `TaskTracker` graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod websocket;
