use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::http::parser::DEFAULT_MAX_CONTENT_LENGTH;
use crate::websocket::frame::DEFAULT_MAX_MESSAGE_SIZE;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub proxy: Option<ProxyConfig>,
    pub postgres: Option<PostgresConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Idle timeout per connection
    pub timeout_secs: u64,
    /// Close after every reply unless the client asks for keep-alive on a 200
    pub close_connection: bool,
    /// Largest request body accepted; longer ones get a 400
    pub max_body_bytes: usize,
    /// Largest reassembled WebSocket message; longer ones close with 1009
    pub max_message_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            timeout_secs: 30,
            close_connection: true,
            max_body_bytes: DEFAULT_MAX_CONTENT_LENGTH,
            max_message_bytes: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Path prefix routed upstream, e.g. `/api`
    pub prefix: String,
    /// Upstream base URL, e.g. `http://127.0.0.1:3000`
    pub upstream: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

impl ProxyConfig {
    /// True when `path` equals the prefix or continues it with `/` or `?`.
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.trim_end_matches('/')) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// `key=value` pairs or a `postgres://` URL
    pub conninfo: String,
    pub size_min: usize,
    pub size_max: usize,
    /// Delay between ping attempts before connecting
    pub ping_retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            conninfo: String::new(),
            size_min: 1,
            size_max: 10,
            ping_retry_delay_ms: 1000,
        }
    }
}

impl PostgresConfig {
    pub fn ping_retry_delay(&self) -> Duration {
        Duration::from_millis(self.ping_retry_delay_ms)
    }
}

impl Config {
    /// Loads the YAML file named by `RAMPART_CONFIG` (defaults when unset);
    /// `LISTEN` overrides the listen address.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var("RAMPART_CONFIG") {
            Ok(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {path}"))?;
                Self::from_yaml(&text)?
            }
            Err(_) => Self::default(),
        };

        if let Ok(listen_addr) = std::env::var("LISTEN") {
            cfg.server.listen_addr = listen_addr;
        }
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Invalid configuration")
    }
}
