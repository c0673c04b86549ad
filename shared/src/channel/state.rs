use std::fmt;

use tracing::{debug, warn};

use crate::channel::history::HistoryBuffer;
use crate::types::update::{Inbound, RealTimeUpdate, decode_inbound};

/// Lifecycle of the underlying socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the channel reacts to, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A connection attempt has started.
    Connecting,
    /// The socket opened.
    Opened,
    /// An inbound text frame.
    Message(String),
    /// The socket closed, cleanly or not.
    Closed,
    /// A transport error. A `Closed` normally follows.
    Errored(String),
}

/// Counters for frames and lifecycle events. Part of every snapshot so
/// callers (and tests) can observe dropped input without scraping logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelDiagnostics {
    pub admitted: u64,
    pub ignored: u64,
    pub malformed: u64,
    pub opened: u64,
    pub closed: u64,
    pub errors: u64,
    pub last_error: Option<String>,
}

/// In-memory state owned by one update channel: connectivity plus the capped
/// history. Mutated only through [`ChannelState::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelState {
    connection: ConnectionState,
    history: HistoryBuffer,
    diagnostics: ChannelDiagnostics,
}

impl ChannelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// The connectivity flag shown to the display layer.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    /// Buffered updates, newest first.
    pub fn updates(&self) -> Vec<RealTimeUpdate> {
        self.history.to_vec()
    }

    pub fn diagnostics(&self) -> &ChannelDiagnostics {
        &self.diagnostics
    }

    /// Fold one event into the state.
    ///
    /// Message frames never touch connectivity. Decode failures are logged
    /// and counted, then dropped.
    pub fn apply(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connecting => {
                self.connection = ConnectionState::Connecting;
            }
            ChannelEvent::Opened => {
                self.connection = ConnectionState::Connected;
                self.diagnostics.opened += 1;
            }
            ChannelEvent::Closed => {
                self.connection = ConnectionState::Disconnected;
                self.diagnostics.closed += 1;
            }
            ChannelEvent::Errored(reason) => {
                self.connection = ConnectionState::Disconnected;
                self.diagnostics.errors += 1;
                self.diagnostics.last_error = Some(reason);
            }
            ChannelEvent::Message(text) => self.apply_message(&text),
        }
    }

    fn apply_message(&mut self, text: &str) {
        match decode_inbound(text) {
            Ok(Inbound::DebtUpdate(update)) => {
                debug!(
                    country = %update.country,
                    impact = %update.impact,
                    "Admitted debt update"
                );
                self.history.push(update);
                self.diagnostics.admitted += 1;
            }
            Ok(Inbound::Other(kind)) => {
                debug!("Ignoring '{}' message", kind);
                self.diagnostics.ignored += 1;
            }
            Err(err) => {
                warn!(error = %err, bytes = text.len(), "Dropping malformed frame");
                self.diagnostics.malformed += 1;
                self.diagnostics.last_error = Some(err.to_string());
            }
        }
    }
}
