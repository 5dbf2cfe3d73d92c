use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};

use crate::error::ClientError;

/// A connected bidirectional text transport.
///
/// `recv` returning `None` means the remote side closed the connection; the
/// connection manager treats that as a server-initiated disconnect and
/// reconnects. Errors from `send`/`recv` end the current session the same
/// way.
#[async_trait]
pub trait Transport: Send + 'static {
    async fn send(&mut self, message: String) -> Result<(), ClientError>;

    async fn recv(&mut self) -> Option<Result<String, ClientError>>;

    async fn close(&mut self) -> Result<(), ClientError>;
}

/// Produces fresh transports — once per (re)connection attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn connect(&self) -> Result<Self::Transport, ClientError>;
}

/// WebSocket transport over tokio-tungstenite.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, message: String) -> Result<(), ClientError> {
        self.stream
            .send(tungstenite::Message::Text(message.into()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ClientError>> {
        loop {
            match self.stream.next().await? {
                Ok(tungstenite::Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(tungstenite::Message::Close(_)) => return None,
                // The protocol is JSON text frames; everything else is
                // transport plumbing.
                Ok(_) => continue,
                Err(e) => return Some(Err(ClientError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}

/// Connects [`WsTransport`]s to a fixed gateway URL.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self) -> Result<WsTransport, ClientError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(WsTransport { stream })
    }
}
