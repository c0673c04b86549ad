use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::ChannelError;
use crate::channel::retry::RetryPolicy;
use crate::channel::state::{ChannelEvent, ChannelState};
use crate::channel::transport::{Connection, Transport, WsTransport, channel_url};
use crate::types::server_config::ChannelConfig;
use crate::types::update::RealTimeUpdate;

/// Longest a connection attempt (TCP, TLS and the WebSocket handshake) may
/// take before it counts as failed.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest the close handshake may take before the socket is dropped.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// An outbound frame, stamped with the session it was accepted for.
#[derive(Debug)]
struct Outbound {
    session: u64,
    text: String,
}

/// Handle to a live update channel.
///
/// Spawning starts one supervisor task that owns the connection, the retry
/// timer and the state. The handle only reads snapshots and queues outbound
/// frames. [`UpdateChannel::close`] (or dropping the handle) stops the task:
/// the connection is closed and no further attempts are made.
#[derive(Debug)]
pub struct UpdateChannel {
    url: String,
    state: watch::Receiver<ChannelState>,
    outbound: mpsc::UnboundedSender<Outbound>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl UpdateChannel {
    /// Spawn over the WebSocket transport using the configured origin, path
    /// and retry policy. Must be called inside a tokio runtime.
    pub fn connect(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let url = channel_url(&config.page_url, &config.path)?;
        Ok(Self::spawn(WsTransport, url, config.retry.clone()))
    }

    /// Spawn the supervisor over any transport. Must be called inside a
    /// tokio runtime.
    pub fn spawn<T: Transport>(transport: T, url: impl Into<String>, policy: RetryPolicy) -> Self {
        let url = url.into();
        let (state_tx, state_rx) = watch::channel(ChannelState::new());
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        info!("Starting update channel for {}", url);

        let task = tokio::spawn(supervise(
            transport,
            url.clone(),
            policy,
            state_tx,
            outbound_rx,
            shutdown_rx,
        ));

        Self {
            url,
            state: state_rx,
            outbound: outbound_tx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> ChannelState {
        self.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// Buffered updates, newest first.
    pub fn updates(&self) -> Vec<RealTimeUpdate> {
        self.state.borrow().updates()
    }

    /// Receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Serialise `payload` to JSON and queue it for transmission.
    ///
    /// Returns `Ok(false)` without transmitting anything when the channel is
    /// not connected. A frame is only ever written to the connection that was
    /// open when it was queued; if that one closes first the frame is dropped
    /// rather than replayed on the next connection.
    pub fn send<P: Serialize + ?Sized>(&self, payload: &P) -> Result<bool, ChannelError> {
        let session = {
            let state = self.state.borrow();
            if !state.is_connected() {
                debug!("Dropping outbound frame: channel not connected");
                return Ok(false);
            }
            state.diagnostics().opened
        };

        let text =
            serde_json::to_string(payload).map_err(|e| ChannelError::Serialize(e.to_string()))?;

        // The task only goes away after shutdown, so a failed send means the
        // frame could not have been transmitted anyway.
        Ok(self.outbound.send(Outbound { session, text }).is_ok())
    }

    /// Close the connection and stop reconnecting. Resolves once the task
    /// has finished.
    pub async fn close(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Update channel task failed: {}", e);
            }
        }
        info!("Update channel for {} closed", self.url);
    }
}

// ---------------------------------------------------------------------------
// Supervisor task
// ---------------------------------------------------------------------------

enum SessionEnd {
    Shutdown,
    Closed,
    Failed(ChannelError),
}

async fn supervise<T: Transport>(
    transport: T,
    url: String,
    policy: RetryPolicy,
    state: watch::Sender<ChannelState>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    mut shutdown: oneshot::Receiver<()>,
) {
    // Consecutive failed connections since the last successful open.
    let mut attempt: u32 = 0;

    loop {
        state.send_modify(|s| s.apply(ChannelEvent::Connecting));
        debug!("Connecting update channel to {}", url);

        let connected = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            result = tokio::time::timeout(CONNECT_TIMEOUT, transport.connect(&url)) => {
                result.unwrap_or_else(|_| {
                    Err(ChannelError::Connect(format!(
                        "timed out after {}s",
                        CONNECT_TIMEOUT.as_secs()
                    )))
                })
            }
        };

        match connected {
            Ok(mut conn) => {
                attempt = 0;
                let mut session = 0;
                state.send_modify(|s| {
                    s.apply(ChannelEvent::Opened);
                    session = s.diagnostics().opened;
                });
                info!(session, "Update channel connected: {}", url);

                match run_session(&mut conn, session, &state, &mut outbound, &mut shutdown).await {
                    SessionEnd::Shutdown => {
                        close_within_limit(&mut conn).await;
                        state.send_modify(|s| s.apply(ChannelEvent::Closed));
                        break;
                    }
                    SessionEnd::Closed => {
                        info!("Update channel closed by peer: {}", url);
                    }
                    SessionEnd::Failed(err) => {
                        warn!("Update channel error on {}: {}", url, err);
                        state.send_modify(|s| s.apply(ChannelEvent::Errored(err.to_string())));
                        close_within_limit(&mut conn).await;
                    }
                }

                state.send_modify(|s| s.apply(ChannelEvent::Closed));
                discard_pending(&mut outbound);
            }
            Err(err) => {
                warn!("Update channel connect to {} failed: {}", url, err);
                state.send_modify(|s| {
                    s.apply(ChannelEvent::Errored(err.to_string()));
                    s.apply(ChannelEvent::Closed);
                });
            }
        }

        attempt = attempt.saturating_add(1);
        let Some(delay) = policy.delay_for(attempt) else {
            error!(
                "Giving up on {} after {} consecutive failed attempts",
                url,
                attempt - 1
            );
            break;
        };

        info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to {}",
            url
        );

        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!("Update channel supervisor for {} stopped", url);
}

async fn run_session<C: Connection>(
    conn: &mut C,
    session: u64,
    state: &watch::Sender<ChannelState>,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    shutdown: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    loop {
        tokio::select! {
            biased;
            _ = &mut *shutdown => return SessionEnd::Shutdown,
            frame = conn.recv() => match frame {
                Some(Ok(text)) => state.send_modify(|s| s.apply(ChannelEvent::Message(text))),
                Some(Err(err)) => return SessionEnd::Failed(err),
                None => return SessionEnd::Closed,
            },
            Some(frame) = outbound.recv() => {
                if frame.session != session {
                    debug!(
                        session,
                        queued_for = frame.session,
                        "Dropping outbound frame queued for an earlier connection"
                    );
                    continue;
                }
                if let Err(err) = conn.send(frame.text).await {
                    return SessionEnd::Failed(err);
                }
            }
        }
    }
}

async fn close_within_limit<C: Connection>(conn: &mut C) {
    if tokio::time::timeout(CLOSE_TIMEOUT, conn.close()).await.is_err() {
        warn!(
            "Close handshake did not finish within {}s, dropping connection",
            CLOSE_TIMEOUT.as_secs()
        );
    }
}

fn discard_pending(outbound: &mut mpsc::UnboundedReceiver<Outbound>) {
    let mut dropped = 0usize;
    while outbound.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        debug!("Discarded {} outbound frames queued before disconnect", dropped);
    }
}
