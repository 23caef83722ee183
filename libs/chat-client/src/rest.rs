use reqwest::Client;
use rtmsockets::HandshakeResponse;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://slack.com/api";

#[derive(Error, Debug)]
pub enum RestError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Deserialization failed: {0}")]
    DeserializeFailed(String),
}

pub type Result<T> = std::result::Result<T, RestError>;

/// A message accepted by `chat.postMessage`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

/// Envelope shared by every Web API method
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

impl ApiResponse {
    fn into_result(self, method: &str) -> Result<Self> {
        if self.ok {
            return Ok(self);
        }
        Err(RestError::ApiError(format!(
            "{} rejected: {}",
            method,
            self.error.as_deref().unwrap_or("unknown error")
        )))
    }
}

/// Web API client for the chat platform
///
/// Holds the bot token and attaches it to every call. The token is
/// never logged.
pub struct RestClient {
    base_url: String,
    token: String,
    client: Client,
}

impl RestClient {
    /// Create new REST client
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start a real-time session
    ///
    /// Returns the body as-is, including `ok=false` responses, so the
    /// session manager can tell a rejected token from a broken request.
    pub async fn rtm_start(&self, mpim_aware: bool) -> Result<HandshakeResponse> {
        let url = format!("{}/rtm.start", self.base_url);
        debug!("Requesting rtm.start from {}", url);

        let mut query = vec![("token", self.token.as_str())];
        if mpim_aware {
            query.push(("mpim_aware", "1"));
        }

        let response = self.client.get(&url).query(&query).send().await?;
        let handshake: HandshakeResponse = Self::read_json(response, "rtm.start").await?;

        debug!(
            "rtm.start returned ok={} with {} channels",
            handshake.ok,
            handshake.channels.len()
        );
        Ok(handshake)
    }

    /// Post a message through `chat.postMessage`
    pub async fn post_message(&self, channel: &str, text: &str) -> Result<PostedMessage> {
        let url = format!("{}/chat.postMessage", self.base_url);
        debug!("Posting message to {}", channel);

        let form = [
            ("token", self.token.as_str()),
            ("channel", channel),
            ("text", text),
        ];
        let response = self.client.post(&url).form(&form).send().await?;
        let body: ApiResponse = Self::read_json(response, "chat.postMessage").await?;
        let body = body.into_result("chat.postMessage")?;

        match (body.channel, body.ts) {
            (Some(channel), Some(ts)) => Ok(PostedMessage { channel, ts }),
            _ => Err(RestError::DeserializeFailed(
                "chat.postMessage response is missing channel or ts".to_string(),
            )),
        }
    }

    /// Add an emoji reaction to a message
    pub async fn add_reaction(&self, name: &str, channel: &str, timestamp: &str) -> Result<()> {
        let url = format!("{}/reactions.add", self.base_url);
        debug!("Adding :{}: to {} in {}", name, timestamp, channel);

        let form = [
            ("token", self.token.as_str()),
            ("name", name),
            ("channel", channel),
            ("timestamp", timestamp),
        ];
        let response = self.client.post(&url).form(&form).send().await?;
        let body: ApiResponse = Self::read_json(response, "reactions.add").await?;
        body.into_result("reactions.add")?;
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response, method: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RestError::ApiError(format!(
                "{} failed with {}: {}",
                method, status, error_text
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| RestError::DeserializeFailed(e.to_string()))
    }
}
