use serde::{Deserialize, Serialize};

use crate::types::server_config::AppConfig;

/// Point-in-time snapshot of runtime server statistics.
/// Serialized and returned by `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStats {
    pub status: String,
    pub server: ServerInfo,
    pub feed: FeedInfo,
    pub runtime: RuntimeInfo,
}

/// Static server configuration values shown in the stats response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub bind: String,
    pub port: u16,
    pub max_connections: usize,
    pub ws_path: String,
}

/// Live counters from the update hub
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedInfo {
    pub enabled: bool,
    pub interval_secs: u64,
    pub published_total: u64,
    pub subscribers: usize,
    pub buffered: usize,
}

/// Runtime process info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeInfo {
    /// Unix timestamp of when the server process started
    pub started_at: i64,
    /// Seconds elapsed since startup
    pub uptime_secs: i64,
}

impl ServerStats {
    /// Build a stats snapshot from config + live hub counters.
    ///
    /// `config` is typically a short-lived read guard from `LiveConfig`:
    /// ```rust,no_run
    /// // let cfg = state.config.read().await;
    /// // let stats = ServerStats::build(&cfg, feed_info, started_at);
    /// // guard drops here
    /// ```
    ///
    /// `started_at` should be captured once at process startup and passed in.
    /// `feed.enabled` and `feed.interval_secs` are taken from `config`.
    pub fn build(config: &AppConfig, mut feed: FeedInfo, started_at: i64) -> Self {
        let now = chrono::Utc::now().timestamp();

        feed.enabled = config.feed.enabled;
        feed.interval_secs = config.feed.interval_secs;

        Self {
            status: "ok".to_string(),
            server: ServerInfo {
                bind: config.server.bind.clone(),
                port: config.server.port,
                max_connections: config.server.max_connections,
                ws_path: config.channel.path.clone(),
            },
            feed,
            runtime: RuntimeInfo {
                started_at,
                uptime_secs: (now - started_at).max(0),
            },
        }
    }
}
