//! Bot configuration
//!
//! Loaded from YAML; the API token comes from the environment and is
//! never read from the file.

use chat_client::rest::DEFAULT_BASE_URL;
use rtmsockets::states::{HasConnector, HasHandshake};
use rtmsockets::{
    ExponentialBackoff, FixedDelay, HandshakeProvider, OverflowPolicy, RtmClient,
    RtmClientBuilder, TungsteniteConnector, DEFAULT_ORIGIN,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const TOKEN_ENV_VAR: &str = "SLACK_TOKEN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main bot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub consumers: ConsumerConfig,

    /// API token from .env (not in YAML)
    #[serde(skip)]
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_true")]
    pub mpim_aware: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            origin: default_origin(),
            mpim_aware: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 0 disables the heartbeat
    pub heartbeat_interval_secs: u64,
    pub handshake_retry_secs: u64,
    pub reconnect_delay_secs: u64,
    pub write_backoff_initial_ms: u64,
    pub write_backoff_max_secs: u64,
    pub read_backoff_initial_ms: u64,
    pub read_backoff_max_secs: u64,
    pub outbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            handshake_retry_secs: 60,
            reconnect_delay_secs: 1,
            write_backoff_initial_ms: 1_000,
            write_backoff_max_secs: 60,
            read_backoff_initial_ms: 1_000,
            read_backoff_max_secs: 30,
            outbound_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowSetting {
    #[default]
    DropOldest,
    Block,
}

impl From<OverflowSetting> for OverflowPolicy {
    fn from(setting: OverflowSetting) -> Self {
        match setting {
            OverflowSetting::DropOldest => OverflowPolicy::DropOldest,
            OverflowSetting::Block => OverflowPolicy::Block,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub capacity: usize,
    pub overflow: OverflowSetting,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            overflow: OverflowSetting::DropOldest,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}

fn default_true() -> bool {
    true
}

impl BotConfig {
    /// Load configuration from YAML file plus the token from the environment
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(config_path)?;

        config.token = std::env::var(TOKEN_ENV_VAR)
            .map_err(|_| ConfigError::EnvVarMissing(TOKEN_ENV_VAR.to_string()))?;
        if config.token.trim().is_empty() {
            return Err(ConfigError::EnvVarMissing(TOKEN_ENV_VAR.to_string()));
        }

        Ok(config)
    }

    /// Load and validate the YAML file alone
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self> {
        let path = config_path.as_ref();
        info!("Loading configuration from {}", path.display());

        let yaml_content = std::fs::read_to_string(path)?;
        let config: BotConfig = serde_yaml::from_str(&yaml_content)?;
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let session = &self.session;

        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "api.base_url must not be empty".to_string(),
            ));
        }
        if session.handshake_retry_secs == 0 {
            return Err(ConfigError::ValidationError(
                "session.handshake_retry_secs must be > 0".to_string(),
            ));
        }
        if session.write_backoff_initial_ms == 0 || session.read_backoff_initial_ms == 0 {
            return Err(ConfigError::ValidationError(
                "backoff initial delays must be > 0".to_string(),
            ));
        }
        if Duration::from_secs(session.write_backoff_max_secs)
            < Duration::from_millis(session.write_backoff_initial_ms)
        {
            return Err(ConfigError::ValidationError(
                "session.write_backoff_max_secs is below the initial delay".to_string(),
            ));
        }
        if Duration::from_secs(session.read_backoff_max_secs)
            < Duration::from_millis(session.read_backoff_initial_ms)
        {
            return Err(ConfigError::ValidationError(
                "session.read_backoff_max_secs is below the initial delay".to_string(),
            ));
        }
        if session.outbound_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "session.outbound_capacity must be > 0".to_string(),
            ));
        }
        if self.consumers.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "consumers.capacity must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Socket connector honoring the configured `Origin`
    pub fn connector(&self) -> TungsteniteConnector {
        if self.api.origin.is_empty() {
            TungsteniteConnector::new().without_origin()
        } else {
            TungsteniteConnector::new().origin(self.api.origin.clone())
        }
    }

    /// Client builder with every session setting applied
    pub fn client_builder(
        &self,
        handshake: impl HandshakeProvider + 'static,
    ) -> RtmClientBuilder<HasHandshake, HasConnector> {
        let session = &self.session;

        let builder = RtmClient::builder()
            .handshake(handshake)
            .connector(self.connector())
            .handshake_policy(FixedDelay::new(
                Duration::from_secs(session.handshake_retry_secs),
                None,
            ))
            .write_policy(ExponentialBackoff::new(
                Duration::from_millis(session.write_backoff_initial_ms),
                Duration::from_secs(session.write_backoff_max_secs),
                None,
            ))
            .read_policy(ExponentialBackoff::escalating(
                Duration::from_millis(session.read_backoff_initial_ms),
                Duration::from_secs(session.read_backoff_max_secs),
            ))
            .reconnect_delay(Duration::from_secs(session.reconnect_delay_secs))
            .outbound_capacity(session.outbound_capacity)
            .consumer_capacity(self.consumers.capacity)
            .overflow_policy(self.consumers.overflow.into());

        match session.heartbeat_interval_secs {
            0 => builder.no_heartbeat(),
            secs => builder.heartbeat(Duration::from_secs(secs)),
        }
    }
}
