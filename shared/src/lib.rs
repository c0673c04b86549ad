//! Common library for the debtwatch push server and terminal dashboard.
//!
//! - [`types`]: wire records, API payloads and config structs
//! - [`config`]: TOML loading, validation and the hot-reloadable [`config::LiveConfig`]
//! - [`channel`]: the reconnecting WebSocket update channel

pub mod channel;
pub mod config;
pub mod types;
