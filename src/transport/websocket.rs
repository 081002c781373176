//! WebSocket transport for talking to the event service
//!
//! Frames travel as WebSocket text messages. Pings are answered by
//! tungstenite itself; binary messages are accepted when they hold UTF-8.

use super::{Connector, Transport, TransportError, TransportResult, NO_STATUS};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame},
    tungstenite::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

/// WebSocket transport connected to the service
pub struct WebSocketTransport {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: Option<TransportError>,
}

impl WebSocketTransport {
    /// Connect to a `ws://` URL
    pub async fn connect(url: &str) -> TransportResult<Self> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("WebSocket connected to {}", url);
        Ok(WebSocketTransport { ws, closed: None })
    }

    fn ensure_open(&self) -> TransportResult<()> {
        match &self.closed {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn mark_closed(&mut self, error: TransportError) -> TransportError {
        self.closed = Some(error.clone());
        error
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: &str) -> TransportResult<()> {
        self.ensure_open()?;

        self.ws
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn receive(&mut self) -> TransportResult<String> {
        self.ensure_open()?;

        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data)
                        .map_err(|e| TransportError::InvalidData(e.to_string()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let error = match frame {
                        Some(frame) => TransportError::Closed {
                            code: u16::from(frame.code),
                            reason: frame.reason.into_owned(),
                        },
                        None => TransportError::Closed {
                            code: NO_STATUS,
                            reason: String::new(),
                        },
                    };
                    return Err(self.mark_closed(error));
                }
                None => return Err(self.mark_closed(TransportError::abnormal())),
                Some(Err(e)) => {
                    debug!("WebSocket error: {}", e);
                    return Err(self.mark_closed(TransportError::abnormal()));
                }
                // Ping, Pong and raw frames
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> TransportResult<()> {
        self.ensure_open()?;
        self.closed = Some(TransportError::Closed {
            code,
            reason: reason.to_string(),
        });

        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        };
        self.ws
            .close(Some(frame))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

/// Dials [`WebSocketTransport`]s to a fixed URL
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    /// Create a connector for the given URL
    pub fn new(url: impl Into<String>) -> Self {
        WebSocketConnector { url: url.into() }
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> TransportResult<Box<dyn Transport>> {
        let transport = WebSocketTransport::connect(&self.url).await?;
        Ok(Box::new(transport))
    }
}
