use crate::error::{Result, RtmError};
use crate::model::{Team, User};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Trait for performing the session handshake
///
/// Implement this trait to define how the client authenticates with the
/// platform and obtains the socket endpoint plus the initial directory.
///
/// The session manager calls it before the first connect and again
/// before every reconnect. Any error is treated as a handshake failure
/// and retried under the handshake retry policy.
#[async_trait]
pub trait HandshakeProvider: Send + Sync {
    /// Perform the handshake
    ///
    /// # Returns
    /// * `Ok(response)` - Raw handshake response; `ok=false` is checked by the caller
    /// * `Err(RtmError)` - Request failed or the body was malformed
    async fn handshake(&self) -> Result<HandshakeResponse>;
}

/// Identity of the connected client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A conversation as listed in the handshake response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_archived: bool,
}

/// Handshake (`rtm.start`) response body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandshakeResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "self", default)]
    pub self_info: SelfInfo,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub channels: Vec<ConversationRecord>,
    #[serde(default)]
    pub groups: Vec<ConversationRecord>,
    #[serde(default)]
    pub ims: Vec<ConversationRecord>,
    #[serde(default)]
    pub mpims: Vec<ConversationRecord>,
    #[serde(default)]
    pub teams: Vec<Team>,
}

impl HandshakeResponse {
    /// Turn `ok=false` or a missing socket endpoint into an error
    pub fn ensure_ok(&self) -> Result<()> {
        if !self.ok {
            return Err(RtmError::HandshakeRejected(
                self.error.clone().unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        if self.url.is_empty() {
            return Err(RtmError::Handshake("response carries no socket url".to_string()));
        }
        Ok(())
    }
}
