//! # Session engine
//!
//! ```text
//!              HandshakeProvider          Connector
//!                     │                       │
//!                     ▼                       ▼
//!  RtmClient ──> session supervisor ──> socket generation
//!                                          ├── reader   ──> consumers ──> reactions
//!                                          ├── writer   <── OutboundQueue
//!                                          └── heartbeat ──> OutboundQueue
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use rtmsockets::{RtmClient, TungsteniteConnector};
//!
//! #[tokio::main]
//! async fn main() -> rtmsockets::Result<()> {
//!     let client = RtmClient::builder()
//!         .handshake(my_handshake)
//!         .connector(TungsteniteConnector::new())
//!         .heartbeat(Duration::from_secs(30))
//!         .start()
//!         .await?;
//!
//!     let replies = client.outbound();
//!     client.register_callback("echo", move |event| {
//!         if let (Some(channel), Some(text)) = (event.channel, event.text) {
//!             let _ = replies.try_enqueue(Event::message(channel, text));
//!         }
//!     });
//!
//!     client.send_message("C024BE91L", "hello").await?;
//!     client.shutdown().await
//! }
//! ```

pub mod builder;
pub mod config;
pub mod connection_state;
pub mod fanout;
pub mod heartbeat;
pub(crate) mod inbound;
pub mod outbound;
pub mod reactions;
pub mod session;
pub mod socket;

// Re-export main types
pub use builder::{states, RtmClientBuilder};
pub use config::ClientConfig;
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
pub use fanout::{ConsumerRegistry, DeliveryQueue, OverflowPolicy};
pub use outbound::OutboundQueue;
pub use reactions::{ReactionCallback, ReactionRegistry};
pub use session::{ClientEvent, Metrics, RtmClient};
pub use socket::{classify_ws_error, TungsteniteConnector, DEFAULT_ORIGIN};

/// Create a new client builder
pub fn builder() -> RtmClientBuilder<states::NoHandshake, states::NoConnector> {
    RtmClientBuilder::new()
}
