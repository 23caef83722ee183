//! Data carried through a session: directory snapshot, events, sessions

pub mod directory;
pub mod event;

pub use directory::{Conversation, ConversationKind, Directory, Team, User, UserProfile};
pub use event::{kinds, Event, EventItem};

use std::sync::Arc;

/// One successfully established session
///
/// Replaced as a whole on every reconnect; never mutated in place.
#[derive(Debug, Clone)]
pub struct Session {
    /// Generation number, 1 for the first session
    pub id: u64,
    pub socket_url: String,
    pub self_id: String,
    pub directory: Arc<Directory>,
}
