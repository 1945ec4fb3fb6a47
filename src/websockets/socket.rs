use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}

/// Write half of a client connection - all the broadcast path needs
#[async_trait]
pub trait OutboundSink: Send + Sync {
    /// Send one text frame to the client
    async fn send_text(&self, frame: String) -> Result<(), SocketError>;

    /// Close the connection; errors are ignored, the peer may already be gone
    async fn close(&self);
}

/// OutboundSink over the write half of an upgraded axum WebSocket
pub struct WebSocketSink {
    inner: Mutex<SplitSink<WebSocket, Message>>,
}

impl WebSocketSink {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            inner: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl OutboundSink for WebSocketSink {
    async fn send_text(&self, frame: String) -> Result<(), SocketError> {
        self.inner
            .lock()
            .await
            .send(Message::Text(frame))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }

    async fn close(&self) {
        let mut sink = self.inner.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    }
}

/// Next inbound text frame, `Ok(None)` once the client closed the connection
pub async fn receive_text(stream: &mut SplitStream<WebSocket>) -> Result<Option<String>, SocketError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Ok(Some(text)),
            Some(Ok(Message::Close(_))) | None => return Ok(None),
            Some(Ok(_)) => continue, // Ignore binary/ping/pong
            Some(Err(e)) => return Err(SocketError::ReceiveFailed(e.to_string())),
        }
    }
}

/// Reads until the client goes away. Inbound text frames only keep the connection alive.
pub async fn run_read_loop(mut stream: SplitStream<WebSocket>, device_id: &str) -> Result<(), SocketError> {
    while let Some(text) = receive_text(&mut stream).await? {
        debug!(device_id = %device_id, size = text.len(), "Heartbeat frame received");
    }
    Ok(())
}
