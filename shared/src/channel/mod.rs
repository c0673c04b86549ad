//! Live `debt_update` channel.
//!
//! A single supervisor task owns the socket and walks the
//! Disconnected → Connecting → Connected cycle, reconnecting according to a
//! [`RetryPolicy`] (fixed 5 s by default). Inbound frames are folded into a
//! [`ChannelState`] whose history is capped at [`HISTORY_CAPACITY`] entries,
//! newest first. Readers get snapshots through a `watch` channel.

pub mod history;
pub mod retry;
pub mod state;
pub mod supervisor;
pub mod transport;

use thiserror::Error;

pub use self::history::{HISTORY_CAPACITY, HistoryBuffer};
pub use self::retry::{DEFAULT_RETRY_DELAY_MS, RetryPolicy};
pub use self::state::{ChannelDiagnostics, ChannelEvent, ChannelState, ConnectionState};
pub use self::supervisor::{CLOSE_TIMEOUT, CONNECT_TIMEOUT, UpdateChannel};
pub use self::transport::{Connection, Transport, WsConnection, WsTransport, channel_url};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("invalid channel URL: {0}")]
    InvalidUrl(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to serialize outbound payload: {0}")]
    Serialize(String),
}
