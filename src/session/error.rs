use thiserror::Error;

/// Session errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Sent while the connection is not open; nothing was queued
    #[error("Not connected")]
    NotConnected,

    /// The session was closed and cannot be reused
    #[error("Session closed")]
    Closed,

    /// Dialing the service failed
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// The connection closed before a response arrived
    #[error("Connection lost ({code}): {reason}")]
    ConnectionLost {
        /// Close code
        code: u16,
        /// Close reason, possibly empty
        reason: String,
    },

    /// The request was dropped by an explicit close
    #[error("Request cancelled")]
    Cancelled,

    /// Publish was called with an event lacking `id`/`sig`
    #[error("Event is not signed")]
    UnsignedEvent,

    /// An inbound frame could not be understood
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// A request payload could not be serialized
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Serialization(e.to_string())
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
