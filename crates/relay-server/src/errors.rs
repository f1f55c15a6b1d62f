//! Server error types.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised while configuring or starting the relay.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound. Fatal at startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Any other listener I/O failure.
    #[error("listener I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The global metrics recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Errors loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file from disk.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid JSON for the config schema.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// `host:port` does not form a socket address.
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),
    /// A value the server cannot run with.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Parse `host:port` into a socket address.
pub fn listen_addr(host: &str, port: u16) -> std::result::Result<SocketAddr, ConfigError> {
    let raw = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    raw.parse().map_err(|_| ConfigError::InvalidAddress(raw))
}
