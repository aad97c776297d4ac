use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message};
use tracing::trace;

use podium_core::{SyncError, SyncErrorCategory};

/// Bidirectional text-frame transport backing one channel.
#[async_trait]
pub trait Transport: Send {
    /// Transmit one serialized text frame.
    async fn send_text(&mut self, text: String) -> Result<(), SyncError>;

    /// Next inbound text frame in delivery order; `None` once the stream is
    /// closed.
    async fn next_text(&mut self) -> Option<Result<String, SyncError>>;

    /// Best-effort close handshake.
    async fn close(&mut self);
}

/// Connection factory seam.
///
/// The registry holds exactly one connector and calls it at most once per
/// live topic; tests substitute counting/scripted implementations.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, SyncError>;
}

/// tokio-tungstenite backed connector used outside tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, SyncError> {
        let (stream, _response) = connect_async(url).await.map_err(|err| {
            SyncError::new(
                SyncErrorCategory::Network,
                "connect_failed",
                format!("websocket connect to '{url}' failed: {err}"),
            )
        })?;

        Ok(Box::new(WsTransport { stream }))
    }
}

struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), SyncError> {
        self.stream.send(Message::Text(text)).await.map_err(|err| {
            SyncError::new(
                SyncErrorCategory::Network,
                "transport_error",
                err.to_string(),
            )
        })
    }

    async fn next_text(&mut self) -> Option<Result<String, SyncError>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(payload)) => {
                    trace!(bytes = payload.len(), "ignoring binary frame");
                }
                // Pongs are produced by the library; both are uninteresting here.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(_)) => return None,
                Ok(Message::Frame(_)) => {}
                Err(err) => {
                    return Some(Err(SyncError::new(
                        SyncErrorCategory::Network,
                        "transport_error",
                        err.to_string(),
                    )));
                }
            }
        }
        None
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
