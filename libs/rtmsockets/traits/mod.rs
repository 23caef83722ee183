//! # rtmsockets traits
//!
//! Seams between the session engine and the outside world:
//!
//! - **HandshakeProvider**: authenticate and fetch the socket endpoint + directory
//! - **Connector / FrameReader / FrameWriter**: open sockets and move text frames
//! - **RetryPolicy**: handshake, write and read retry delays
//! - **EventSink**: consumer destinations for inbound events

pub mod backoff;
pub mod error;
pub mod handshake;
pub mod sink;
pub mod transport;

// Re-export commonly used types
pub use backoff::{ExponentialBackoff, FixedDelay, NeverRetry, RetryPolicy};
pub use error::{Result, RtmError};
pub use handshake::{ConversationRecord, HandshakeProvider, HandshakeResponse, SelfInfo};
pub use sink::{CallbackSink, EventSink};
pub use transport::{Connector, FailureClass, FrameReader, FrameResult, FrameWriter, TransportError};
