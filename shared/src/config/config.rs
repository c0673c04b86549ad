use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

use crate::channel::{RetryPolicy, channel_url};
use crate::types::server_config::{AppConfig, ConfigError};

pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path.display());

    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let config = parse_config(&contents)?;

    info!("Configuration loaded successfully");

    Ok(config)
}

/// Parse and validate a TOML document. An empty string yields the defaults.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = toml::from_str(contents)?;
    debug!("Config: {:?}", config);

    validate_config(&config)?;

    info!("Config validated");

    Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.bind.trim().is_empty() {
        return Err(ConfigError::InvalidConfig("bind cannot be empty".into()));
    }

    if config.server.max_connections == 0 {
        return Err(ConfigError::InvalidConfig(
            "max_connections must be greater than 0".into(),
        ));
    }

    if config.server.request_timeout_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "request_timeout_secs must be greater than 0".into(),
        ));
    }

    if config.feed.interval_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "feed.interval_secs must be greater than 0".into(),
        ));
    }

    if config.feed.broadcast_capacity == 0 {
        return Err(ConfigError::InvalidConfig(
            "feed.broadcast_capacity must be greater than 0".into(),
        ));
    }

    if !config.channel.path.starts_with('/') {
        return Err(ConfigError::InvalidConfig(
            "channel.path must start with '/'".into(),
        ));
    }

    // The socket URL is derived at spawn time; reject an origin we could never
    // turn into ws:// or wss://.
    channel_url(&config.channel.page_url, &config.channel.path)
        .map_err(|e| ConfigError::InvalidConfig(format!("channel.page_url: {}", e)))?;

    validate_retry(&config.channel.retry)
}

fn validate_retry(policy: &RetryPolicy) -> Result<(), ConfigError> {
    match policy {
        RetryPolicy::Fixed { delay_ms } => {
            if *delay_ms == 0 {
                return Err(ConfigError::InvalidConfig(
                    "retry.delay_ms must be greater than 0".into(),
                ));
            }
        }
        RetryPolicy::Exponential {
            initial_ms,
            max_ms,
            multiplier,
            max_attempts,
            ..
        } => {
            if *initial_ms == 0 {
                return Err(ConfigError::InvalidConfig(
                    "retry.initial_ms must be greater than 0".into(),
                ));
            }
            if initial_ms > max_ms {
                return Err(ConfigError::InvalidConfig(
                    "retry.initial_ms cannot exceed retry.max_ms".into(),
                ));
            }
            if !multiplier.is_finite() || *multiplier < 1.0 {
                return Err(ConfigError::InvalidConfig(
                    "retry.multiplier must be at least 1.0".into(),
                ));
            }
            if *max_attempts == Some(0) {
                return Err(ConfigError::InvalidConfig(
                    "retry.max_attempts must be greater than 0 when set".into(),
                ));
            }
        }
    }

    Ok(())
}
