//! Directory snapshot
//!
//! Built once per session from the handshake response and never modified
//! afterwards. A reconnect builds a brand new snapshot; nothing carries over.
//!
//! Conversations of every kind share one identifier namespace. The id prefix
//! tells the kinds apart: `C` public channel, `G` private group or
//! multi-party DM, `D` direct message.

use crate::handshake::{ConversationRecord, HandshakeResponse};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub skype: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub profile: UserProfile,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub is_restricted: bool,
    #[serde(default)]
    pub has_2fa: bool,
}

impl User {
    /// Name to show in logs and replies
    pub fn display_name(&self) -> &str {
        if self.profile.real_name.is_empty() {
            &self.name
        } else {
            &self.profile.real_name
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email_domain: String,
    #[serde(default)]
    pub domain: String,
}

/// Partition a conversation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationKind {
    PublicChannel,
    PrivateGroup,
    DirectMessage,
    MultiPartyDirectMessage,
}

impl ConversationKind {
    /// Guess the partition from an identifier's shape
    ///
    /// `G` is ambiguous between private groups and multi-party DMs.
    pub fn from_id(id: &str) -> Option<Self> {
        let mut chars = id.chars();
        let prefix = chars.next()?;
        let rest = chars.as_str();
        if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
            return None;
        }
        match prefix {
            'C' => Some(ConversationKind::PublicChannel),
            'G' => Some(ConversationKind::PrivateGroup),
            'D' => Some(ConversationKind::DirectMessage),
            _ => None,
        }
    }
}

/// A conversation plus its outbound sequence counter
#[derive(Debug)]
pub struct Conversation {
    pub id: String,
    pub name: String,
    pub is_archived: bool,
    pub kind: ConversationKind,
    sequence: AtomicU64,
}

impl Conversation {
    pub fn new(record: ConversationRecord, kind: ConversationKind) -> Self {
        Self {
            id: record.id,
            name: record.name,
            is_archived: record.is_archived,
            kind,
            sequence: AtomicU64::new(0),
        }
    }

    /// Next outbound sequence id for this conversation, starting at 1
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Last sequence id handed out (0 if none)
    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }
}

/// Immutable per-session directory of users, conversations and teams
#[derive(Debug, Default)]
pub struct Directory {
    users: HashMap<String, User>,
    user_names: HashMap<String, String>,
    channels: HashMap<String, Arc<Conversation>>,
    groups: HashMap<String, Arc<Conversation>>,
    ims: HashMap<String, Arc<Conversation>>,
    mpims: HashMap<String, Arc<Conversation>>,
    conversation_names: HashMap<String, String>,
    teams: HashMap<String, Team>,
    team_names: HashMap<String, String>,
    /// Counters for conversations the handshake did not list
    adhoc_sequences: Mutex<HashMap<String, u64>>,
}

impl Directory {
    /// Build a snapshot from a handshake response
    ///
    /// Later duplicates of an identifier replace earlier ones.
    pub fn from_handshake(response: &HandshakeResponse) -> Self {
        let mut directory = Directory::default();

        for user in &response.users {
            directory.user_names.insert(user.name.clone(), user.id.clone());
            directory.users.insert(user.id.clone(), user.clone());
        }

        let partitions = [
            (&response.channels, ConversationKind::PublicChannel),
            (&response.groups, ConversationKind::PrivateGroup),
            (&response.ims, ConversationKind::DirectMessage),
            (&response.mpims, ConversationKind::MultiPartyDirectMessage),
        ];
        for (records, kind) in partitions {
            for record in records {
                directory.insert_conversation(Conversation::new(record.clone(), kind));
            }
        }

        for team in &response.teams {
            directory.team_names.insert(team.name.clone(), team.id.clone());
            directory.teams.insert(team.id.clone(), team.clone());
        }

        directory
    }

    fn insert_conversation(&mut self, conversation: Conversation) {
        if !conversation.name.is_empty() {
            self.conversation_names
                .insert(conversation.name.clone(), conversation.id.clone());
        }
        let id = conversation.id.clone();
        let conversation = Arc::new(conversation);
        match conversation.kind {
            ConversationKind::PublicChannel => self.channels.insert(id, conversation),
            ConversationKind::PrivateGroup => self.groups.insert(id, conversation),
            ConversationKind::DirectMessage => self.ims.insert(id, conversation),
            ConversationKind::MultiPartyDirectMessage => self.mpims.insert(id, conversation),
        };
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.get(id)
    }

    pub fn user_by_name(&self, name: &str) -> Option<&User> {
        self.user_names.get(name).and_then(|id| self.users.get(id))
    }

    /// Look a conversation up by id or by name
    ///
    /// Identifiers are dispatched on their prefix; anything that does not
    /// look like an identifier (or is not found) is tried as a name, with
    /// an optional leading `#`.
    pub fn conversation(&self, id_or_name: &str) -> Option<&Arc<Conversation>> {
        self.conversation_by_id(id_or_name)
            .or_else(|| self.conversation_by_name(id_or_name))
    }

    /// Prefix picks the likely partition; listed ids outside it still resolve
    pub fn conversation_by_id(&self, id: &str) -> Option<&Arc<Conversation>> {
        let by_prefix = match ConversationKind::from_id(id) {
            Some(ConversationKind::PrivateGroup | ConversationKind::MultiPartyDirectMessage) => {
                self.groups.get(id).or_else(|| self.mpims.get(id))
            }
            Some(ConversationKind::DirectMessage) => self.ims.get(id),
            Some(ConversationKind::PublicChannel) => self.channels.get(id),
            None => None,
        };
        by_prefix.or_else(|| self.find_in_partitions(id))
    }

    pub fn conversation_by_name(&self, name: &str) -> Option<&Arc<Conversation>> {
        let name = name.strip_prefix('#').unwrap_or(name);
        let id = self.conversation_names.get(name)?;
        self.conversation_by_id(id)
    }

    fn find_in_partitions(&self, id: &str) -> Option<&Arc<Conversation>> {
        self.channels
            .get(id)
            .or_else(|| self.groups.get(id))
            .or_else(|| self.ims.get(id))
            .or_else(|| self.mpims.get(id))
    }

    pub fn team(&self, id: &str) -> Option<&Team> {
        self.teams.get(id)
    }

    pub fn team_by_name(&self, name: &str) -> Option<&Team> {
        self.team_names.get(name).and_then(|id| self.teams.get(id))
    }

    /// Next outbound sequence id for a conversation
    ///
    /// Known conversations use the counter on their record. Unknown ids get a
    /// counter scoped to this snapshot so numbering stays per-conversation.
    pub fn next_sequence(&self, conversation_id: &str) -> u64 {
        if let Some(conversation) = self.conversation_by_id(conversation_id) {
            return conversation.next_sequence();
        }

        let mut adhoc = self.adhoc_sequences.lock();
        let counter = adhoc.entry(conversation_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn conversation_count(&self) -> usize {
        self.channels.len() + self.groups.len() + self.ims.len() + self.mpims.len()
    }

    pub fn team_count(&self) -> usize {
        self.teams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::SelfInfo;

    fn record(id: &str, name: &str) -> ConversationRecord {
        ConversationRecord {
            id: id.to_string(),
            name: name.to_string(),
            is_archived: false,
        }
    }

    fn response() -> HandshakeResponse {
        HandshakeResponse {
            ok: true,
            url: "wss://example.test/socket".to_string(),
            self_info: SelfInfo {
                id: "U0BOT".to_string(),
                name: "bot".to_string(),
            },
            users: vec![User {
                id: "U1".to_string(),
                name: "alice".to_string(),
                is_admin: true,
                ..User::default()
            }],
            channels: vec![record("C1", "general"), record("C2", "random")],
            groups: vec![record("G1", "secret")],
            ims: vec![record("D1", "")],
            mpims: vec![record("G2", "mpdm-alice--bob-1")],
            teams: vec![Team {
                id: "T1".to_string(),
                name: "acme".to_string(),
                domain: "acme".to_string(),
                ..Team::default()
            }],
            ..HandshakeResponse::default()
        }
    }

    #[test]
    fn test_lookup_by_id_dispatches_on_prefix() {
        let directory = Directory::from_handshake(&response());

        assert_eq!(directory.conversation("C1").unwrap().kind, ConversationKind::PublicChannel);
        assert_eq!(directory.conversation("G1").unwrap().kind, ConversationKind::PrivateGroup);
        assert_eq!(
            directory.conversation("G2").unwrap().kind,
            ConversationKind::MultiPartyDirectMessage
        );
        assert_eq!(directory.conversation("D1").unwrap().kind, ConversationKind::DirectMessage);
        assert!(directory.conversation("C404").is_none());
    }

    #[test]
    fn test_lookup_by_name() {
        let directory = Directory::from_handshake(&response());

        assert_eq!(directory.conversation("general").unwrap().id, "C1");
        assert_eq!(directory.conversation("#random").unwrap().id, "C2");
        assert_eq!(directory.conversation_by_name("secret").unwrap().id, "G1");
        assert!(directory.conversation("nope").is_none());
    }

    #[test]
    fn test_users_and_teams() {
        let directory = Directory::from_handshake(&response());

        assert!(directory.user("U1").unwrap().is_admin);
        assert_eq!(directory.user_by_name("alice").unwrap().id, "U1");
        assert_eq!(directory.team("T1").unwrap().domain, "acme");
        assert_eq!(directory.team_by_name("acme").unwrap().id, "T1");
        assert_eq!(directory.user_count(), 1);
        assert_eq!(directory.conversation_count(), 5);
        assert_eq!(directory.team_count(), 1);
    }

    #[test]
    fn test_sequences_are_per_conversation() {
        let directory = Directory::from_handshake(&response());

        assert_eq!(directory.next_sequence("C1"), 1);
        assert_eq!(directory.next_sequence("C1"), 2);
        assert_eq!(directory.next_sequence("C2"), 1);
        assert_eq!(directory.next_sequence("C1"), 3);
        assert_eq!(directory.conversation("C1").unwrap().last_sequence(), 3);
    }

    #[test]
    fn test_unknown_conversation_gets_its_own_counter() {
        let directory = Directory::from_handshake(&response());

        assert_eq!(directory.next_sequence("C999"), 1);
        assert_eq!(directory.next_sequence("C999"), 2);
        assert_eq!(directory.next_sequence("C1"), 1);
    }

    #[test]
    fn test_id_outside_its_prefix_partition_still_resolves() {
        let mut handshake = response();
        handshake.groups.push(record("C0PRIV", "private-room"));
        handshake.channels.push(record("legacy-7", "old-style"));
        let directory = Directory::from_handshake(&handshake);

        let private = directory.conversation("C0PRIV").expect("listed group found by id");
        assert_eq!(private.kind, ConversationKind::PrivateGroup);
        assert_eq!(private.name, "private-room");
        assert!(directory.conversation_by_id("legacy-7").is_some());

        assert_eq!(directory.next_sequence("C0PRIV"), 1);
        assert_eq!(private.last_sequence(), 1);
    }

    #[test]
    fn test_kind_from_id() {
        assert_eq!(ConversationKind::from_id("C024BE91L"), Some(ConversationKind::PublicChannel));
        assert_eq!(ConversationKind::from_id("D024BE91L"), Some(ConversationKind::DirectMessage));
        assert_eq!(ConversationKind::from_id("general"), None);
        assert_eq!(ConversationKind::from_id("C"), None);
        assert_eq!(ConversationKind::from_id(""), None);
    }
}
