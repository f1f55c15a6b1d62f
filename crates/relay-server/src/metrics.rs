//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::ServerError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup, before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: cause).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Upgrades refused because the connection limit was reached (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Parsed inbound messages (counter, labels: type).
pub const MESSAGES_RECEIVED_TOTAL: &str = "relay_messages_received_total";
/// Pass-through messages queued for their target (counter, labels: type).
pub const MESSAGES_FORWARDED_TOTAL: &str = "relay_messages_forwarded_total";
/// Messages dropped by the relay (counter, labels: reason).
pub const MESSAGES_DROPPED_TOTAL: &str = "relay_messages_dropped_total";
/// Frames that could not be queued on a peer connection (counter).
pub const SEND_FAILURES_TOTAL: &str = "relay_send_failures_total";
/// Identities evicted with `removeUser` (counter).
pub const EVICTIONS_TOTAL: &str = "relay_evictions_total";
/// Registered identities (gauge).
pub const REGISTERED_IDENTITIES: &str = "relay_registered_identities";
