use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{error, info};

use crate::error::SyncError;
use crate::models::WireMessage;

/// Outbound half of an open transport
#[async_trait]
pub trait TransportSink: Send {
    async fn send(&mut self, msg: WireMessage) -> Result<(), SyncError>;
    async fn close(&mut self);
}

/// Inbound half of an open transport. `next_message` returns `None` once
/// the peer has closed; a `Protocol` error means one undecodable frame and
/// the stream stays usable.
#[async_trait]
pub trait TransportStream: Send {
    async fn next_message(&mut self) -> Option<Result<WireMessage, SyncError>>;
}

/// Factory for transport connections. The engine talks to the relay only
/// through this seam, so tests can substitute an in-memory implementation.
#[async_trait]
pub trait Transport: Send {
    async fn open(&mut self, endpoint: &str) -> Result<(Box<dyn TransportSink>, Box<dyn TransportStream>), SyncError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport backed by tokio-tungstenite
#[derive(Debug, Default)]
pub struct WebSocketTransport;

pub struct WebSocketSink {
    sink: SplitSink<WsStream, Message>,
}

pub struct WebSocketReceiver {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&mut self, endpoint: &str) -> Result<(Box<dyn TransportSink>, Box<dyn TransportStream>), SyncError> {
        info!("Opening WebSocket connection to {}", endpoint);
        let (socket, _response) = connect_async(endpoint)
            .await
            .map_err(|e| SyncError::Transport(format!("connect to {} failed: {}", endpoint, e)))?;

        // Split the socket into sender and receiver halves
        let (sink, stream) = socket.split();
        Ok((
            Box::new(WebSocketSink { sink }),
            Box::new(WebSocketReceiver { stream }),
        ))
    }
}

#[async_trait]
impl TransportSink for WebSocketSink {
    async fn send(&mut self, msg: WireMessage) -> Result<(), SyncError> {
        let text = serde_json::to_string(&msg)
            .map_err(|e| SyncError::Protocol(format!("failed to serialize {} frame: {}", msg.kind(), e)))?;
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| SyncError::Transport(format!("send failed: {}", e)))
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.send(Message::Close(None)).await {
            // The peer may already be gone; closing is best effort.
            info!("Close frame not delivered: {}", e);
        }
        let _ = self.sink.close().await;
    }
}

#[async_trait]
impl TransportStream for WebSocketReceiver {
    async fn next_message(&mut self) -> Option<Result<WireMessage, SyncError>> {
        // Skip non-text frames; pings/pongs are handled by tungstenite itself.
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str::<WireMessage>(&text).map_err(|e| {
                        error!("Failed to parse inbound frame: {}", e);
                        SyncError::Protocol(format!("malformed frame: {}", e))
                    }));
                }
                Ok(Message::Close(_)) => {
                    info!("Peer closed the connection");
                    return None;
                }
                Ok(_) => continue,
                Err(e) => {
                    error!("WebSocket receive error: {}", e);
                    return Some(Err(SyncError::Transport(format!("receive failed: {}", e))));
                }
            }
        }
        None
    }
}
