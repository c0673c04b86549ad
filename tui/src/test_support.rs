//! In-memory transport for driving the dashboard without a server.

use std::time::Duration;

use tokio::sync::{mpsc, watch};

use shared::channel::{ChannelError, ChannelState, Connection, RetryPolicy, Transport, UpdateChannel};

pub const URL: &str = "ws://dashboard.test/ws";

/// Accepts every connection (or refuses every one) and hands the test the
/// server side of the socket.
#[derive(Clone)]
pub struct LocalTransport {
    accept: bool,
    peers: mpsc::UnboundedSender<LocalPeer>,
}

pub struct LocalPeer {
    pub frames: mpsc::UnboundedSender<String>,
    pub sent: mpsc::UnboundedReceiver<String>,
}

pub struct LocalConnection {
    frames: mpsc::UnboundedReceiver<String>,
    sent: mpsc::UnboundedSender<String>,
}

impl Transport for LocalTransport {
    type Connection = LocalConnection;

    async fn connect(&self, _url: &str) -> Result<LocalConnection, ChannelError> {
        if !self.accept {
            return Err(ChannelError::Connect("connection refused".into()));
        }
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let _ = self.peers.send(LocalPeer {
            frames: frames_tx,
            sent: sent_rx,
        });
        Ok(LocalConnection {
            frames: frames_rx,
            sent: sent_tx,
        })
    }
}

impl Connection for LocalConnection {
    async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
        self.frames.recv().await.map(Ok)
    }

    async fn send(&mut self, text: String) -> Result<(), ChannelError> {
        self.sent
            .send(text)
            .map_err(|_| ChannelError::Transport("peer gone".into()))
    }

    async fn close(&mut self) {}
}

/// Channel whose every connect attempt is refused. Retries stay far off.
pub fn offline_channel() -> UpdateChannel {
    let (peers, _) = mpsc::unbounded_channel();
    UpdateChannel::spawn(LocalTransport { accept: false, peers }, URL, RetryPolicy::default())
}

/// Channel that gives up after its first refused attempt, so its
/// supervisor task ends.
pub fn abandoned_channel() -> UpdateChannel {
    let (peers, _) = mpsc::unbounded_channel();
    let policy = RetryPolicy::Exponential {
        initial_ms: 1,
        max_ms: 1,
        multiplier: 1.0,
        jitter: false,
        max_attempts: Some(0),
    };
    UpdateChannel::spawn(LocalTransport { accept: false, peers }, URL, policy)
}

/// Channel connected to a local peer. Resolves once the socket is open.
pub async fn online_channel() -> (UpdateChannel, LocalPeer) {
    let (peers_tx, mut peers_rx) = mpsc::unbounded_channel();
    let transport = LocalTransport {
        accept: true,
        peers: peers_tx,
    };
    let channel = UpdateChannel::spawn(transport, URL, RetryPolicy::default());
    let mut rx = channel.subscribe();

    let peer = within(peers_rx.recv()).await.expect("transport dropped");
    wait_for(&mut rx, |s| s.is_connected()).await;
    (channel, peer)
}

pub async fn wait_for(
    rx: &mut watch::Receiver<ChannelState>,
    pred: impl FnMut(&ChannelState) -> bool,
) -> ChannelState {
    within(rx.wait_for(pred))
        .await
        .expect("channel task dropped its state")
        .clone()
}

pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}
