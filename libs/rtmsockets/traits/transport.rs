//! Socket transport abstraction
//!
//! The session manager never touches a concrete WebSocket type. It asks a
//! [`Connector`] for a fresh pair of halves on every (re)connect and hands
//! the reader half to the inbound task and the writer half to the outbound
//! task. Errors coming out of either half are already classified, so the
//! pipelines only decide *how long* to wait, never *what* went wrong.

use async_trait::async_trait;
use std::fmt;

/// How a transport failure should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Socket is dead (closed, EOF, reset, unreachable, timed out)
    Fatal,
    /// Anything else, retry on the same socket
    Transient,
}

/// A classified read or write failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub class: FailureClass,
    pub message: String,
}

impl TransportError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Fatal,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Transient,
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.class == FailureClass::Fatal
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class {
            FailureClass::Fatal => write!(f, "fatal: {}", self.message),
            FailureClass::Transient => write!(f, "transient: {}", self.message),
        }
    }
}

impl std::error::Error for TransportError {}

/// Result type for a single frame operation
pub type FrameResult<T> = std::result::Result<T, TransportError>;

/// Reading half of an open socket
///
/// Owned by exactly one inbound task for the lifetime of a socket generation.
#[async_trait]
pub trait FrameReader: Send {
    /// Wait for the next text frame
    ///
    /// Control frames (ping/pong) are handled internally and never returned.
    /// End of stream is reported as a fatal error.
    async fn read_frame(&mut self) -> FrameResult<String>;
}

/// Writing half of an open socket
///
/// Owned by exactly one outbound task for the lifetime of a socket generation.
#[async_trait]
pub trait FrameWriter: Send {
    /// Write one text frame
    async fn write_frame(&mut self, frame: &str) -> FrameResult<()>;

    /// Best-effort close of the socket
    async fn close(&mut self);
}

/// Opens sockets
///
/// Called once per (re)connect with the endpoint returned by the handshake.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
    ) -> crate::Result<(Box<dyn FrameWriter>, Box<dyn FrameReader>)>;
}
