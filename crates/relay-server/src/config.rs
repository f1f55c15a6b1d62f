//! Server configuration.
//!
//! Loading flow:
//! 1. Start with compiled [`ServerConfig::default()`]
//! 2. If a config file is given, fields present in it override the defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate; zero intervals or limits are rejected

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ConfigError;

/// Configuration for the relay server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8080`, `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before new ones are dropped.
    pub send_queue_capacity: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a connection that has not answered a ping for this many seconds.
    pub heartbeat_timeout_secs: u64,
    /// How long shutdown waits for sessions to finish.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            max_connections: 10_000,
            max_message_size: 1024 * 1024, // 1 MB
            send_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Load defaults, then the optional file, then env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// [`load`](Self::load) with an explicit environment lookup.
    pub fn load_with(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(env);
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = [
            ("max_connections", self.max_connections == 0),
            ("max_message_size", self.max_message_size == 0),
            ("send_queue_capacity", self.send_queue_capacity == 0),
            ("heartbeat_interval_secs", self.heartbeat_interval_secs == 0),
            ("heartbeat_timeout_secs", self.heartbeat_timeout_secs == 0),
        ];
        match zero.iter().find(|(_, is_zero)| *is_zero) {
            Some(&(field, _)) => Err(ConfigError::Invalid {
                field,
                reason: "must be greater than zero",
            }),
            None => Ok(()),
        }
    }

    /// Read a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(?path, "loading config file");
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply `PORT` and `RELAY_*` environment overrides.
    ///
    /// Invalid values are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = read_u16(&env, "PORT", 0, 65535) {
            self.port = v;
        }
        if let Some(v) = env("RELAY_HOST").filter(|v| !v.is_empty()) {
            self.host = v;
        }
        if let Some(v) = read_usize(&env, "RELAY_MAX_CONNECTIONS", 1, 1_000_000) {
            self.max_connections = v;
        }
        if let Some(v) = read_usize(&env, "RELAY_MAX_MESSAGE_SIZE", 1024, 64 * 1024 * 1024) {
            self.max_message_size = v;
        }
        if let Some(v) = read_usize(&env, "RELAY_SEND_QUEUE", 1, 65_536) {
            self.send_queue_capacity = v;
        }
        if let Some(v) = read_u64(&env, "RELAY_HEARTBEAT_INTERVAL", 1, 3600) {
            self.heartbeat_interval_secs = v;
        }
        if let Some(v) = read_u64(&env, "RELAY_HEARTBEAT_TIMEOUT", 1, 3600) {
            self.heartbeat_timeout_secs = v;
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_u16(
    env: impl Fn(&str) -> Option<String>,
    name: &str,
    min: u16,
    max: u16,
) -> Option<u16> {
    let val = env(name)?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_u64(
    env: impl Fn(&str) -> Option<String>,
    name: &str,
    min: u64,
    max: u64,
) -> Option<u64> {
    let val = env(name)?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_usize(
    env: impl Fn(&str) -> Option<String>,
    name: &str,
    min: usize,
    max: usize,
) -> Option<usize> {
    let val = env(name)?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.max_connections, 10_000);
        assert_eq!(cfg.max_message_size, 1024 * 1024);
        assert_eq!(cfg.send_queue_capacity, 256);
        assert_eq!(cfg.heartbeat_interval_secs, 30);
        assert_eq!(cfg.heartbeat_timeout_secs, 90);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: ServerConfig = serde_json::from_str(r#"{"port":3000}"#).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.send_queue_capacity, 256);
    }

    #[test]
    fn from_file_reads_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"host":"127.0.0.1","max_connections":5}}"#).unwrap();
        let cfg = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.max_connections, 5);
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn from_file_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = ServerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn from_file_missing() {
        let err = ServerConfig::from_file(Path::new("/nonexistent/relay.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn env_overrides_apply() {
        let env = env_from(&[
            ("PORT", "9000"),
            ("RELAY_HOST", "127.0.0.1"),
            ("RELAY_HEARTBEAT_INTERVAL", "5"),
        ]);
        let cfg = ServerConfig::load_with(None, env).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.heartbeat_interval_secs, 5);
    }

    #[test]
    fn invalid_port_env_keeps_default() {
        for bad in ["abc", "70000", "-1", ""] {
            let cfg = ServerConfig::load_with(None, env_from(&[("PORT", bad)])).unwrap();
            assert_eq!(cfg.port, 8080, "PORT={bad:?}");
        }
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let env = env_from(&[
            ("RELAY_MAX_CONNECTIONS", "0"),
            ("RELAY_HEARTBEAT_TIMEOUT", "soon"),
        ]);
        let cfg = ServerConfig::load_with(None, env).unwrap();
        assert_eq!(cfg.max_connections, 10_000);
        assert_eq!(cfg.heartbeat_timeout_secs, 90);
    }

    #[test]
    fn zero_heartbeat_interval_in_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"host":"127.0.0.1","port":0,"heartbeat_interval_secs":0}}"#).unwrap();
        let err = ServerConfig::load_with(Some(file.path()), env_from(&[])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "heartbeat_interval_secs", .. }
        ));
    }

    #[test]
    fn zero_limits_are_rejected() {
        for field in [
            "max_connections",
            "max_message_size",
            "send_queue_capacity",
            "heartbeat_timeout_secs",
        ] {
            let json = format!(r#"{{"{field}":0}}"#);
            let cfg: ServerConfig = serde_json::from_str(&json).unwrap();
            let err = cfg.validate().unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { field: f, .. } if f == field));
        }
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn env_fixes_zero_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"heartbeat_timeout_secs":0}}"#).unwrap();
        let env = env_from(&[("RELAY_HEARTBEAT_TIMEOUT", "30")]);
        let cfg = ServerConfig::load_with(Some(file.path()), env).unwrap();
        assert_eq!(cfg.heartbeat_timeout_secs, 30);
    }

    #[test]
    fn parse_u16_bounds() {
        assert_eq!(parse_u16_range("8080", 0, 65535), Some(8080));
        assert_eq!(parse_u16_range(" 9000 ", 0, 65535), Some(9000));
        assert_eq!(parse_u16_range("70000", 0, 65535), None);
        assert_eq!(parse_u16_range("abc", 0, 65535), None);
        assert_eq!(parse_u16_range("0", 1, 10), None);
    }

    #[test]
    fn parse_u64_and_usize_bounds() {
        assert_eq!(parse_u64_range("30", 1, 3600), Some(30));
        assert_eq!(parse_u64_range("0", 1, 3600), None);
        assert_eq!(parse_usize_range("256", 1, 65_536), Some(256));
        assert_eq!(parse_usize_range("-1", 1, 65_536), None);
    }
}
