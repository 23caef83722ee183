//! # rtmsockets
//!
//! Client engine for a team-chat real-time messaging stream.
//!
//! ## Features
//!
//! - **Self-healing sessions**: fatal socket errors trigger a fresh handshake and a new directory
//! - **Single writer**: one outbound queue, per-conversation sequence ids, backoff on write errors
//! - **Independent consumers**: every consumer has its own bounded queue and delivery task
//! - **Reaction correlation**: callbacks keyed by `(channel, ts)` that survive reconnects
//! - **Type-state builder**: handshake provider and connector are enforced at compile time

pub mod core;
pub mod model;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core client functionality
pub use self::core::{
    builder, config, connection_state, fanout, heartbeat, outbound, reactions, session, socket,
    builder::{states, RtmClientBuilder},
    config::ClientConfig,
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState},
    fanout::{ConsumerRegistry, OverflowPolicy},
    outbound::OutboundQueue,
    reactions::{ReactionCallback, ReactionRegistry},
    session::{ClientEvent, Metrics, RtmClient},
    socket::{classify_ws_error, TungsteniteConnector, DEFAULT_ORIGIN},
};

pub use model::{
    directory, event, kinds, Conversation, ConversationKind, Directory, Event, EventItem, Session,
    Team, User, UserProfile,
};

// Convenience function
pub use self::core::builder as client_builder;
