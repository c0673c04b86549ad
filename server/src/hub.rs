use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};

use shared::channel::HistoryBuffer;
use shared::types::{FeedInfo, RealTimeUpdate};

/// Fan-out point for published updates.
///
/// One broadcast channel feeds every WebSocket session; the last few
/// publications are kept so new sessions and `GET /api/updates` can see what
/// happened before they arrived.
#[derive(Debug)]
pub struct UpdateHub {
    sender: broadcast::Sender<RealTimeUpdate>,
    /// Held for writing while a publication is sent so that
    /// [`UpdateHub::subscribe_with_history`] never duplicates or misses one.
    history: RwLock<HistoryBuffer>,
    published: AtomicU64,
}

impl UpdateHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            history: RwLock::new(HistoryBuffer::new()),
            published: AtomicU64::new(0),
        }
    }

    /// Record and broadcast an update. Returns how many sessions it reached.
    pub async fn publish(&self, update: RealTimeUpdate) -> usize {
        let mut history = self.history.write().await;
        self.published.fetch_add(1, Ordering::Relaxed);

        info!(
            "Publishing {} update for {} to {} subscribers",
            update.impact,
            update.country,
            self.sender.receiver_count()
        );

        history.push(update.clone());
        match self.sender.send(update) {
            Ok(count) => count,
            Err(_) => {
                debug!("No subscribers for published update");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealTimeUpdate> {
        self.sender.subscribe()
    }

    /// Snapshot of recent updates (newest first) plus a receiver positioned
    /// right after them.
    pub async fn subscribe_with_history(
        &self,
    ) -> (Vec<RealTimeUpdate>, broadcast::Receiver<RealTimeUpdate>) {
        let history = self.history.read().await;
        (history.to_vec(), self.sender.subscribe())
    }

    /// Newest first, at most `limit`.
    pub async fn recent(&self, limit: usize) -> Vec<RealTimeUpdate> {
        self.history.read().await.recent(limit)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn published_total(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Live counters for the stats response. `enabled` and `interval_secs`
    /// are filled in from config by `ServerStats::build`.
    pub async fn feed_info(&self) -> FeedInfo {
        FeedInfo {
            published_total: self.published_total(),
            subscribers: self.subscriber_count(),
            buffered: self.history.read().await.len(),
            ..FeedInfo::default()
        }
    }
}
