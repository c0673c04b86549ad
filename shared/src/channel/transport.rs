use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use http::Uri;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use tungstenite::Message;
use tungstenite::error::Error as WsError;

use crate::channel::ChannelError;

/// Opens connections for the supervisor. The WebSocket implementation is
/// [`WsTransport`]; tests substitute an in-memory one.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;

    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Connection, ChannelError>> + Send;
}

/// One open text-message connection.
pub trait Connection: Send + 'static {
    /// Next inbound text frame. `None` once the peer has closed.
    ///
    /// Must be cancel safe: the supervisor races it against outbound sends
    /// and shutdown.
    fn recv(&mut self) -> impl Future<Output = Option<Result<String, ChannelError>>> + Send;

    fn send(&mut self, text: String) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Best-effort close handshake.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Derive the socket URL from the origin the dashboard was served from.
///
/// `https` and `wss` origins map to `wss`, `http` and `ws` to `ws`. Only the
/// host and port of `page_url` are kept; its path is replaced by `path`.
pub fn channel_url(page_url: &str, path: &str) -> Result<String, ChannelError> {
    let uri: Uri = page_url
        .trim()
        .parse()
        .map_err(|e: http::uri::InvalidUri| {
            ChannelError::InvalidUrl(format!("{}: {}", page_url, e))
        })?;

    let scheme = match uri.scheme_str() {
        Some(s) if s.eq_ignore_ascii_case("https") || s.eq_ignore_ascii_case("wss") => "wss",
        Some(s) if s.eq_ignore_ascii_case("http") || s.eq_ignore_ascii_case("ws") => "ws",
        Some(other) => {
            return Err(ChannelError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                other, page_url
            )));
        }
        None => {
            return Err(ChannelError::InvalidUrl(format!(
                "missing scheme in {}",
                page_url
            )));
        }
    };

    let authority = uri
        .authority()
        .ok_or_else(|| ChannelError::InvalidUrl(format!("missing host in {}", page_url)))?;

    let host = match authority.port_u16() {
        Some(port) => format!("{}:{}", authority.host(), port),
        None => authority.host().to_string(),
    };

    Ok(format!("{}://{}{}", scheme, host, path))
}

// ---------------------------------------------------------------------------
// WebSocket transport
// ---------------------------------------------------------------------------

/// `tokio-tungstenite` client transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Transport for WsTransport {
    type Connection = WsConnection;

    async fn connect(&self, url: &str) -> Result<WsConnection, ChannelError> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        debug!(status = %response.status(), "WebSocket handshake complete: {}", url);

        Ok(WsConnection { stream })
    }
}

impl Connection for WsConnection {
    async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                // Decoded the same way as text; non-UTF-8 bytes end up malformed.
                Ok(Message::Binary(bytes)) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()));
                }
                Ok(Message::Close(frame)) => {
                    debug!("Peer sent close frame: {:?}", frame);
                    return None;
                }
                // Pongs are queued by tungstenite itself.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(ChannelError::Transport(e.to_string()))),
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<(), ChannelError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Close handshake failed: {}", e);
        }
    }
}
