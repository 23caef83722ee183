//! `rtm.start` as a session handshake

use crate::rest::RestClient;
use async_trait::async_trait;
use rtmsockets::{HandshakeProvider, HandshakeResponse, Result, RtmError};
use std::sync::Arc;
use tracing::debug;

/// Handshake provider backed by the Web API `rtm.start` method
#[derive(Clone)]
pub struct RtmStartHandshake {
    rest: Arc<RestClient>,
    mpim_aware: bool,
}

impl RtmStartHandshake {
    pub fn new(rest: Arc<RestClient>) -> Self {
        Self {
            rest,
            mpim_aware: true,
        }
    }

    /// Whether multi-party direct messages are listed separately
    pub fn mpim_aware(mut self, enabled: bool) -> Self {
        self.mpim_aware = enabled;
        self
    }
}

#[async_trait]
impl HandshakeProvider for RtmStartHandshake {
    async fn handshake(&self) -> Result<HandshakeResponse> {
        debug!("Performing rtm.start handshake");
        self.rest
            .rtm_start(self.mpim_aware)
            .await
            .map_err(|e| RtmError::Handshake(e.to_string()))
    }
}
