//! Transport layer abstraction
//!
//! A transport moves text frames over one message-framed duplex connection:
//! - WebSocket connections (for talking to the service)
//! - In-memory channels (for testing)
//!
//! # Design
//!
//! Transports know nothing about frame contents. Closure is reported as
//! [`TransportError::Closed`] carrying the close code, so the session layer
//! can tell a normal shutdown (1000) from a dropped connection. A
//! [`Connector`] dials fresh transports, which is how the session reconnects.

use async_trait::async_trait;
use thiserror::Error;

pub mod websocket;
pub use websocket::{WebSocketConnector, WebSocketTransport};

/// Close code for a normal, intentional shutdown
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when no close code was received
pub const NO_STATUS: u16 = 1005;

/// Close code for a connection that dropped without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed
    #[error("Connection closed ({code}): {reason}")]
    Closed {
        /// Close code
        code: u16,
        /// Close reason, possibly empty
        reason: String,
    },

    /// Send failed
    #[error("Failed to send: {0}")]
    SendFailed(String),

    /// Receive failed
    #[error("Failed to receive: {0}")]
    ReceiveFailed(String),

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl TransportError {
    /// Closed without a close frame
    pub fn abnormal() -> Self {
        TransportError::Closed {
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
        }
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Abstract transport trait
///
/// All transports must implement this trait. The transport is responsible
/// only for moving text frames; framing and correlation live above it.
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame to the peer
    async fn send(&mut self, frame: &str) -> TransportResult<()>;

    /// Receive the next text frame
    ///
    /// Blocks until a frame is available or the connection is closed.
    async fn receive(&mut self) -> TransportResult<String>;

    /// Close the connection with the given code and reason
    async fn close(&mut self, code: u16, reason: &str) -> TransportResult<()>;
}

/// Dials new transports
///
/// A session holds one connector for its whole life and calls it again on
/// every reconnect.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a fresh connection
    async fn connect(&self) -> TransportResult<Box<dyn Transport>>;
}

/// In-memory transport for testing
///
/// Uses channels to simulate a connection between two endpoints.
pub mod memory {
    use super::*;
    use tokio::sync::mpsc;

    enum Signal {
        Frame(String),
        Close { code: u16, reason: String },
    }

    /// Create a pair of connected in-memory transports
    pub fn create_pair() -> (MemoryTransport, MemoryTransport) {
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();

        let transport1 = MemoryTransport {
            tx: tx1,
            rx: rx2,
            closed: None,
        };

        let transport2 = MemoryTransport {
            tx: tx2,
            rx: rx1,
            closed: None,
        };

        (transport1, transport2)
    }

    /// In-memory transport endpoint
    ///
    /// Dropping an endpoint looks like an abnormal closure (1006) to the peer.
    pub struct MemoryTransport {
        tx: mpsc::UnboundedSender<Signal>,
        rx: mpsc::UnboundedReceiver<Signal>,
        closed: Option<TransportError>,
    }

    impl MemoryTransport {
        fn ensure_open(&self) -> TransportResult<()> {
            match &self.closed {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&mut self, frame: &str) -> TransportResult<()> {
            self.ensure_open()?;

            self.tx
                .send(Signal::Frame(frame.to_string()))
                .map_err(|_| TransportError::SendFailed("Channel closed".to_string()))
        }

        async fn receive(&mut self) -> TransportResult<String> {
            self.ensure_open()?;

            let error = match self.rx.recv().await {
                Some(Signal::Frame(frame)) => return Ok(frame),
                Some(Signal::Close { code, reason }) => TransportError::Closed { code, reason },
                None => TransportError::abnormal(),
            };
            self.closed = Some(error.clone());
            Err(error)
        }

        async fn close(&mut self, code: u16, reason: &str) -> TransportResult<()> {
            self.ensure_open()?;

            // Peer may already be gone
            let _ = self.tx.send(Signal::Close {
                code,
                reason: reason.to_string(),
            });
            self.closed = Some(TransportError::Closed {
                code,
                reason: reason.to_string(),
            });
            Ok(())
        }
    }

    /// Create a connector and the listener that accepts its connections
    pub fn listener() -> (MemoryConnector, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MemoryConnector { tx }, MemoryListener { rx })
    }

    /// Client side of [`listener`]: every `connect` hands the peer end to the listener
    #[derive(Clone)]
    pub struct MemoryConnector {
        tx: mpsc::UnboundedSender<MemoryTransport>,
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn connect(&self) -> TransportResult<Box<dyn Transport>> {
            let (client, server) = create_pair();
            self.tx
                .send(server)
                .map_err(|_| TransportError::ConnectionFailed("Listener dropped".to_string()))?;
            Ok(Box::new(client))
        }
    }

    /// Server side of [`listener`]
    pub struct MemoryListener {
        rx: mpsc::UnboundedReceiver<MemoryTransport>,
    }

    impl MemoryListener {
        /// Wait for the next incoming connection
        ///
        /// Returns None once every connector is dropped.
        pub async fn accept(&mut self) -> Option<MemoryTransport> {
            self.rx.recv().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_transport() {
        let (mut alice, mut bob) = memory::create_pair();

        // Alice sends to Bob
        alice.send("Hello Bob").await.unwrap();
        assert_eq!(bob.receive().await.unwrap(), "Hello Bob");

        // Bob sends to Alice
        bob.send("Hello Alice").await.unwrap();
        assert_eq!(alice.receive().await.unwrap(), "Hello Alice");
    }

    #[tokio::test]
    async fn test_memory_transport_close() {
        let (mut alice, mut bob) = memory::create_pair();

        alice.close(NORMAL_CLOSURE, "bye").await.unwrap();

        // Should fail after close
        assert!(alice.send("test").await.is_err());

        // Peer sees the close code
        assert_eq!(
            bob.receive().await,
            Err(TransportError::Closed {
                code: NORMAL_CLOSURE,
                reason: "bye".to_string()
            })
        );
        assert!(bob.receive().await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_peer_is_abnormal() {
        let (mut alice, bob) = memory::create_pair();
        drop(bob);

        assert_eq!(alice.receive().await, Err(TransportError::abnormal()));
    }

    #[tokio::test]
    async fn test_listener_accepts() {
        let (connector, mut listener) = memory::listener();

        let mut client = connector.connect().await.unwrap();
        let mut server = listener.accept().await.unwrap();

        client.send("ping").await.unwrap();
        assert_eq!(server.receive().await.unwrap(), "ping");
        server.send("pong").await.unwrap();
        assert_eq!(client.receive().await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn test_connect_without_listener_fails() {
        let (connector, listener) = memory::listener();
        drop(listener);

        assert!(matches!(
            connector.connect().await,
            Err(TransportError::ConnectionFailed(_))
        ));
    }
}
