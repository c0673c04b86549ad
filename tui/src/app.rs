//! Dashboard state and event loop.
//!
//! The update channel runs on the tokio runtime; this loop stays synchronous
//! and only reads snapshots from the channel's watch receiver.

use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::DefaultTerminal;
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};

use shared::channel::{ChannelState, UpdateChannel};

/// Keyboard poll granularity.
const POLL: Duration = Duration::from_millis(50);
/// Relative times must keep moving even when nothing arrives.
const REDRAW_EVERY: Duration = Duration::from_secs(1);

pub struct App {
    channel: UpdateChannel,
    snapshots: watch::Receiver<ChannelState>,
    state: ChannelState,
    notice: Option<String>,
    running: bool,
}

impl App {
    pub fn new(channel: UpdateChannel) -> Self {
        let snapshots = channel.subscribe();
        let state = snapshots.borrow().clone();
        Self {
            channel,
            snapshots,
            state,
            notice: None,
            running: true,
        }
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn url(&self) -> &str {
        self.channel.url()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn into_channel(self) -> UpdateChannel {
        self.channel
    }

    pub fn run(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        let mut dirty = true;
        let mut last_draw = Instant::now();

        while self.running {
            if dirty || last_draw.elapsed() >= REDRAW_EVERY {
                terminal.draw(|f| super::ui::draw(f, self))?;
                dirty = false;
                last_draw = Instant::now();
            }

            if event::poll(POLL)?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                self.handle_key(key.code);
                dirty = true;
            }

            if self.refresh() {
                dirty = true;
            }
        }

        Ok(())
    }

    /// Pull the latest snapshot if the channel published one.
    fn refresh(&mut self) -> bool {
        match self.snapshots.has_changed() {
            Ok(true) => {
                self.state = self.snapshots.borrow_and_update().clone();
                true
            }
            Ok(false) => false,
            Err(_) => {
                warn!("Update channel stopped");
                self.running = false;
                false
            }
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Char('p') => self.ping(),
            _ => {}
        }
    }

    fn ping(&mut self) {
        let payload = json!({ "type": "ping", "sent_at": Utc::now().to_rfc3339() });
        self.notice = Some(match self.channel.send(&payload) {
            Ok(true) => {
                info!("Ping sent");
                "ping sent".to_string()
            }
            Ok(false) => "offline, ping not sent".to_string(),
            Err(e) => {
                warn!("Ping failed: {}", e);
                format!("ping failed: {}", e)
            }
        });
    }
}
