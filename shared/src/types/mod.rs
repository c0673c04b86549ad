pub mod json_error;
pub mod server_config;
pub mod server_stats;
pub mod update;

pub use self::json_error::{ApiError, ErrorResponse};
pub use self::server_config::{AppConfig, ChannelConfig, ConfigError, FeedConfig, ServerConfig};
pub use self::server_stats::{FeedInfo, ServerStats};
pub use self::update::{DEBT_UPDATE, DecodeError, Impact, Inbound, RealTimeUpdate, decode_inbound};
