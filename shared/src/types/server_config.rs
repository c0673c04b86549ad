use serde::Deserialize;
use thiserror::Error;

use crate::channel::RetryPolicy;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Mock feed that publishes `debt_update` frames to every `/ws` subscriber.
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Hot-reload safe: read on every tick.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Hot-reload safe: NO, the broadcast channel is sized once at startup.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    /// Replay recent updates (oldest first) to a fresh WebSocket session.
    #[serde(default = "default_true")]
    pub replay_on_connect: bool,
}

/// Client-side settings for the update channel.
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    /// Origin of the dashboard page; the socket URL is derived from it.
    #[serde(default = "default_page_url")]
    pub page_url: String,
    #[serde(default = "default_ws_path")]
    pub path: String,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Full bind address, e.g. `"127.0.0.1:1337"`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl FeedConfig {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_connections: default_max_connections(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval(),
            broadcast_capacity: default_broadcast_capacity(),
            replay_on_connect: true,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            page_url: default_page_url(),
            path: default_ws_path(),
            retry: RetryPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

pub fn default_bind() -> String {
    "127.0.0.1".to_string()
}

pub fn default_port() -> u16 {
    1337
}

pub fn default_max_connections() -> usize {
    1000
}

pub fn default_request_timeout() -> u64 {
    30
}

pub fn default_interval() -> u64 {
    5
}

pub fn default_broadcast_capacity() -> usize {
    100
}

pub fn default_page_url() -> String {
    "http://127.0.0.1:1337".to_string()
}

pub fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_true() -> bool {
    true
}
