//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use courier_shared::constants::{DEFAULT_MAX_UPLOAD_SIZE, DEFAULT_PUSH_BUFFER};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file holding the message log.
    /// Env: `DATABASE_PATH`
    /// Default: `./messenger.db`
    pub database_path: PathBuf,

    /// Directory where uploaded files are written.
    /// Env: `UPLOAD_DIR`
    /// Default: `./uploads`
    pub upload_dir: PathBuf,

    /// Maximum upload size in bytes.
    /// Env: `MAX_UPLOAD_SIZE`
    /// Default: 50 MiB
    pub max_upload_size: usize,

    /// Push frames buffered per connection before delivery to it fails.
    /// Env: `PUSH_BUFFER`
    /// Default: `64`
    pub push_buffer: usize,

    /// Close a push connection after this long without an inbound frame.
    /// Env: `WS_IDLE_TIMEOUT_SECS` (`0` disables)
    /// Default: disabled
    pub idle_timeout: Option<Duration>,

    /// How long a write waits on a locked database before failing.
    /// Env: `DB_BUSY_TIMEOUT_MS`
    /// Default: `5000`
    pub db_busy_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: PathBuf::from("./messenger.db"),
            upload_dir: PathBuf::from("./uploads"),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            push_buffer: DEFAULT_PUSH_BUFFER,
            idle_timeout: None,
            db_busy_timeout: Duration::from_millis(5000),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(path);
        }

        if let Some(n) = parse_positive(&lookup, "MAX_UPLOAD_SIZE") {
            config.max_upload_size = n;
        }

        if let Some(n) = parse_positive(&lookup, "PUSH_BUFFER") {
            config.push_buffer = n;
        }

        if let Some(val) = lookup("WS_IDLE_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(0) => config.idle_timeout = None,
                Ok(secs) => config.idle_timeout = Some(Duration::from_secs(secs)),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid WS_IDLE_TIMEOUT_SECS, using default")
                }
            }
        }

        if let Some(ms) = parse_positive(&lookup, "DB_BUSY_TIMEOUT_MS") {
            config.db_busy_timeout = Duration::from_millis(ms as u64);
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let val = lookup(key)?;
    match val.parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(key, value = %val, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.push_buffer, DEFAULT_PUSH_BUFFER);
        assert!(config.idle_timeout.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATABASE_PATH", "/tmp/relay.db"),
            ("PUSH_BUFFER", "8"),
            ("WS_IDLE_TIMEOUT_SECS", "30"),
            ("DB_BUSY_TIMEOUT_MS", "250"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.database_path, PathBuf::from("/tmp/relay.db"));
        assert_eq!(config.push_buffer, 8);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.db_busy_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("PUSH_BUFFER", "0"),
            ("MAX_UPLOAD_SIZE", "lots"),
            ("WS_IDLE_TIMEOUT_SECS", "0"),
        ]);
        let default = ServerConfig::default();
        assert_eq!(config.http_addr, default.http_addr);
        assert_eq!(config.push_buffer, default.push_buffer);
        assert_eq!(config.max_upload_size, default.max_upload_size);
        assert!(config.idle_timeout.is_none());
    }
}
