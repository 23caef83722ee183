use thiserror::Error;

/// Main error type for rtmsockets
#[derive(Error, Debug)]
pub enum RtmError {
    /// Handshake request failed (transport error, non-success status, malformed body)
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Platform answered the handshake with `ok=false`
    #[error("Handshake rejected by platform: {0}")]
    HandshakeRejected(String),

    /// A bounded handshake retry policy gave up
    #[error("Handshake failed after {attempts} attempts: {reason}")]
    HandshakeExhausted { attempts: usize, reason: String },

    /// Socket is unusable and must be rebuilt through a full reconnect
    #[error("Socket failure: {0}")]
    SocketFatal(String),

    /// Momentary read/write hiccup, safe to retry on the same socket
    #[error("Transient I/O error: {0}")]
    Transient(String),

    /// Inbound frame could not be decoded into an event
    #[error("Decode error: {0}")]
    Decode(String),

    /// A consumer failed to process an event
    #[error("Consumer error: {0}")]
    Consumer(String),

    /// A consumer's receiving side is gone, delivery to it stops
    #[error("Consumer '{0}' is gone")]
    ConsumerGone(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The client is shutting down
    #[error("Client is shutting down")]
    Shutdown,
}

/// Result type for rtmsockets operations
pub type Result<T> = std::result::Result<T, RtmError>;
