//! # signal-relay
//!
//! Signaling relay binary: loads configuration, installs logging and
//! metrics, and serves the relay until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_core::logging::{LogFormat, init_subscriber};
use relay_server::config::ServerConfig;
use relay_server::server::RelayServer;

/// WebRTC signaling relay.
#[derive(Parser, Debug)]
#[command(name = "signal-relay", about = "WebRTC signaling relay")]
struct Cli {
    /// Host to bind (overrides the config file).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign). The `PORT` env var is read by the
    /// config loader.
    #[arg(long)]
    port: Option<u16>,

    /// Path to a JSON config file.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format (`compact` or `json`).
    #[arg(long, default_value = "compact")]
    log_format: LogFormat,
}

impl Cli {
    /// Load the config and apply command-line overrides on top.
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = ServerConfig::load(self.config.as_deref()).with_context(|| {
            match &self.config {
                Some(path) => format!("Failed to load config from {}", path.display()),
                None => "Failed to load config".to_string(),
            }
        })?;
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_subscriber(&cli.log_level, cli.log_format);

    let config = cli.server_config()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        max_connections = config.max_connections,
        "starting signaling relay"
    );

    let mut server = RelayServer::new(config);
    match relay_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled"),
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("signaling relay listening on ws://{addr}/ws");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.graceful_shutdown().await;
    let _ = handle.await;
    Ok(())
}
