//! Events flowing over the real-time socket
//!
//! One type serves both directions. Inbound frames are decoded with
//! [`Event::decode`]; outbound events are written with [`Event::encode`],
//! which only emits the `{id, type, channel?, text?}` wire shape.

use crate::{Result, RtmError};
use serde::{Deserialize, Deserializer, Serialize};

/// Well-known event kinds
pub mod kinds {
    pub const MESSAGE: &str = "message";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const ERROR: &str = "error";
    pub const HELLO: &str = "hello";
    pub const REACTION_ADDED: &str = "reaction_added";
}

/// Reference to the message a reaction points at
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventItem {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
}

/// Inbound or outbound real-time event
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Event {
    /// Sequence id; assigned by the outbound pipeline, 0 when unscoped
    #[serde(default)]
    pub id: u64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default, deserialize_with = "string_or_id")]
    pub channel: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "string_or_id")]
    pub user: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub reply_to: Option<u64>,
    #[serde(default)]
    pub item: Option<EventItem>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub reaction: Option<String>,
    /// The frame this event was decoded from
    #[serde(skip)]
    pub raw: Option<String>,
}

/// Outbound wire shape
#[derive(Serialize)]
struct OutboundFrame<'a> {
    id: u64,
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

impl Event {
    /// Outbound chat message
    pub fn message(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: kinds::MESSAGE.to_string(),
            channel: Some(channel.into()),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Keep-alive event, never bound to a conversation
    pub fn heartbeat() -> Self {
        Self {
            kind: kinds::PING.to_string(),
            ..Self::default()
        }
    }

    /// Decode one inbound frame and normalize it
    pub fn decode(frame: &str) -> Result<Self> {
        let mut event: Event =
            serde_json::from_str(frame).map_err(|e| RtmError::Decode(e.to_string()))?;
        event.normalize();
        event.raw = Some(frame.to_string());
        Ok(event)
    }

    /// Serialize to the outbound wire shape
    pub fn encode(&self) -> Result<String> {
        let frame = OutboundFrame {
            id: self.id,
            kind: &self.kind,
            channel: self.channel.as_deref().filter(|c| !c.is_empty()),
            text: self.text.as_deref(),
        };
        serde_json::to_string(&frame).map_err(|e| RtmError::Decode(e.to_string()))
    }

    /// Lift `item.channel` / `item.ts` to the top level when no channel is present
    ///
    /// Reaction events reference the reacted-to message only through `item`;
    /// after this step every event exposes `channel`/`ts` the same way.
    pub fn normalize(&mut self) {
        if self.channel.as_deref().map_or(false, |c| !c.is_empty()) {
            return;
        }
        if let Some(item) = &self.item {
            if let Some(channel) = item.channel.as_ref().filter(|c| !c.is_empty()) {
                self.channel = Some(channel.clone());
                self.ts = item.ts.clone();
            }
        }
    }

    /// Conversation this event targets, if any
    #[inline]
    pub fn conversation(&self) -> Option<&str> {
        self.channel.as_deref().filter(|c| !c.is_empty())
    }

    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        self.kind == kinds::PING
    }

    #[inline]
    pub fn is_reaction(&self) -> bool {
        self.kind == kinds::REACTION_ADDED
    }

    /// False for frames that only matter to the connection itself
    pub fn is_user_facing(&self) -> bool {
        !self.kind.is_empty() && self.kind != kinds::ERROR && self.kind != kinds::PONG
    }
}

/// Accept either `"C123"` or `{"id": "C123", ...}`
fn string_or_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Id(String),
        Object { id: String },
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Id(id)) | Some(Raw::Object { id }) => Some(id),
        None => None,
    })
}
