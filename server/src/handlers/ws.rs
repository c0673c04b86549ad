use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use hyper::header::{
    CONNECTION, HeaderMap, HeaderValue, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use hyper::upgrade::Upgraded;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::WebSocketStream;
use tungstenite::Message;
use tungstenite::handshake::derive_accept_key;
use tungstenite::protocol::Role;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::json_response::{HttpResponse, deliver_error_json, empty};
use crate::AppState;
use shared::types::{ApiError, RealTimeUpdate};

type WsStream = WebSocketStream<TokioIo<Upgraded>>;

/// True when the headers ask for a WebSocket upgrade.
pub fn is_websocket_request(headers: &HeaderMap) -> bool {
    let upgrade = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    let connection = headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade")));
    upgrade && connection
}

/// Validate the handshake headers and compute `Sec-WebSocket-Accept`.
pub fn accept_key(headers: &HeaderMap) -> Result<String, ApiError> {
    if !is_websocket_request(headers) {
        return Err(ApiError::UpgradeRequired);
    }
    if let Some(version) = headers.get(SEC_WEBSOCKET_VERSION)
        && version.as_bytes() != b"13"
    {
        return Err(ApiError::InvalidPayload(
            "unsupported Sec-WebSocket-Version".into(),
        ));
    }
    headers
        .get(SEC_WEBSOCKET_KEY)
        .map(|key| derive_accept_key(key.as_bytes()))
        .ok_or_else(|| ApiError::InvalidPayload("missing Sec-WebSocket-Key".into()))
}

/// GET on the stream path: answer 101 and hand the socket to a session task.
pub async fn handle_upgrade(
    mut req: Request<hyper::body::Incoming>,
    state: AppState,
) -> Result<HttpResponse> {
    let accept = match accept_key(req.headers()) {
        Ok(accept) => accept,
        Err(e) => return deliver_error_json(&e),
    };

    let session_id = Uuid::new_v4();
    let on_upgrade = hyper::upgrade::on(&mut req);

    tokio::task::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let ws = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None)
                    .await;
                run_session(ws, state, session_id).await;
            }
            Err(e) => warn!(%session_id, "WebSocket upgrade failed: {}", e),
        }
    });

    let mut res = Response::new(empty());
    *res.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = res.headers_mut();
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(SEC_WEBSOCKET_ACCEPT, HeaderValue::from_str(&accept)?);
    Ok(res)
}

async fn send_update(
    sink: &mut futures_util::stream::SplitSink<WsStream, Message>,
    update: &RealTimeUpdate,
    state: &AppState,
) -> Result<()> {
    let frame = update.to_wire()?;
    let len = frame.len() as u64;
    sink.send(Message::Text(frame)).await?;
    state.metrics.record_frame_sent(len);
    Ok(())
}

async fn run_session(ws: WsStream, state: AppState, session_id: Uuid) {
    let (mut sink, mut stream) = ws.split();
    state.metrics.ws_session_start();
    let replay = state.config.read().await.feed.replay_on_connect;
    let (history, mut updates) = state.hub.subscribe_with_history().await;

    info!(
        %session_id,
        "WebSocket session opened ({} subscribers)",
        state.hub.subscriber_count()
    );

    // history is newest first; clients prepend, so send oldest first
    if replay {
        for update in history.iter().rev() {
            if let Err(e) = send_update(&mut sink, update, &state).await {
                debug!(%session_id, "Replay aborted: {}", e);
                break;
            }
        }
    }

    loop {
        tokio::select! {
            received = updates.recv() => match received {
                Ok(update) => {
                    if let Err(e) = send_update(&mut sink, &update, &state).await {
                        debug!(%session_id, "Send failed: {}", e);
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(%session_id, "Session lagged, skipped {} updates", missed);
                }
                Err(RecvError::Closed) => break,
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    state.metrics.record_bytes_received(text.len() as u64);
                    debug!(%session_id, "Inbound frame: {}", text);
                }
                Some(Ok(Message::Binary(data))) => {
                    state.metrics.record_bytes_received(data.len() as u64);
                    debug!(%session_id, "Inbound binary frame, {} bytes", data.len());
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(%session_id, "Read failed: {}", e);
                    break;
                }
            },
        }
    }

    let _ = sink.close().await;
    state.metrics.ws_session_end();
    info!(%session_id, "WebSocket session closed");
}
