pub mod states;

use crate::config::*;
use crate::core::fanout::OverflowPolicy;
use crate::session::RtmClient;
use crate::model::Event;
use crate::traits::*;
use parking_lot::Mutex;
use states::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Optional settings carried across type-state transitions
struct Settings {
    handshake_policy: Option<Arc<dyn RetryPolicy>>,
    write_policy: Option<Arc<dyn RetryPolicy>>,
    read_policy: Option<Arc<dyn RetryPolicy>>,
    heartbeat_interval: Option<Duration>,
    reconnect_delay: Duration,
    outbound_capacity: usize,
    consumer_capacity: usize,
    overflow: OverflowPolicy,
    consumers: Vec<(String, Box<dyn EventSink>)>,
    shutdown: Option<CancellationToken>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            handshake_policy: None,
            write_policy: None,
            read_policy: None,
            heartbeat_interval: Some(DEFAULT_HEARTBEAT_INTERVAL),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            consumer_capacity: DEFAULT_CONSUMER_CAPACITY,
            overflow: OverflowPolicy::default(),
            consumers: Vec::new(),
            shutdown: None,
        }
    }
}

/// Type-state builder for [`RtmClient`]
///
/// A handshake provider and a connector must both be set before the client
/// can be built or started. Everything else has a default.
///
/// ```ignore
/// let client = rtmsockets::builder()
///     .handshake(RtmStartHandshake::new(rest))
///     .connector(TungsteniteConnector::new())
///     .callback("logger", |event| println!("{:?}", event))
///     .start()
///     .await?;
/// ```
pub struct RtmClientBuilder<H, C>
where
    H: HandshakeState,
    C: ConnectorState,
{
    _state: TypeState<H, C>,
    handshake: Option<Arc<dyn HandshakeProvider>>,
    connector: Option<Arc<dyn Connector>>,
    settings: Settings,
}

impl RtmClientBuilder<NoHandshake, NoConnector> {
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            handshake: None,
            connector: None,
            settings: Settings::default(),
        }
    }
}

impl Default for RtmClientBuilder<NoHandshake, NoConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> RtmClientBuilder<NoHandshake, C>
where
    C: ConnectorState,
{
    pub fn handshake(
        self,
        provider: impl HandshakeProvider + 'static,
    ) -> RtmClientBuilder<HasHandshake, C> {
        RtmClientBuilder {
            _state: TypeState::new(),
            handshake: Some(Arc::new(provider)),
            connector: self.connector,
            settings: self.settings,
        }
    }
}

impl<H> RtmClientBuilder<H, NoConnector>
where
    H: HandshakeState,
{
    pub fn connector(self, connector: impl Connector + 'static) -> RtmClientBuilder<H, HasConnector> {
        RtmClientBuilder {
            _state: TypeState::new(),
            handshake: self.handshake,
            connector: Some(Arc::new(connector)),
            settings: self.settings,
        }
    }
}

// Optional configuration methods
impl<H, C> RtmClientBuilder<H, C>
where
    H: HandshakeState,
    C: ConnectorState,
{
    /// Retry policy for failed handshakes (default: flat 60s, unlimited)
    pub fn handshake_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.settings.handshake_policy = Some(Arc::new(policy));
        self
    }

    /// Retry policy for failed writes (default: 1s doubling, capped at 60s)
    pub fn write_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.settings.write_policy = Some(Arc::new(policy));
        self
    }

    /// Retry policy for transient read errors (default: 1s doubling up to 30s)
    ///
    /// When the policy returns `None` the error is treated as fatal and the
    /// session reconnects.
    pub fn read_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.settings.read_policy = Some(Arc::new(policy));
        self
    }

    pub fn heartbeat(mut self, interval: Duration) -> Self {
        self.settings.heartbeat_interval = Some(interval);
        self
    }

    pub fn no_heartbeat(mut self) -> Self {
        self.settings.heartbeat_interval = None;
        self
    }

    /// Wait between dropping a dead socket and the next handshake
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.settings.reconnect_delay = delay;
        self
    }

    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.settings.outbound_capacity = capacity;
        self
    }

    /// Queue size of every consumer registered on this client
    pub fn consumer_capacity(mut self, capacity: usize) -> Self {
        self.settings.consumer_capacity = capacity;
        self
    }

    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.settings.overflow = policy;
        self
    }

    /// Register a consumer that sees every event from the first session on
    pub fn consumer(mut self, name: impl Into<String>, sink: impl EventSink) -> Self {
        self.settings.consumers.push((name.into(), Box::new(sink)));
        self
    }

    pub fn channel(self, name: impl Into<String>, sender: mpsc::Sender<Event>) -> Self {
        self.consumer(name, sender)
    }

    pub fn callback<F>(self, name: impl Into<String>, callback: F) -> Self
    where
        F: FnMut(Event) + Send + 'static,
    {
        self.consumer(name, CallbackSink::new(callback))
    }

    /// Use an external token for coordinated shutdown
    ///
    /// Cancelling the token stops reconnects and terminates the client, the
    /// same as [`RtmClient::shutdown`].
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.settings.shutdown = Some(token);
        self
    }
}

// Build methods - only available when all required fields are set
impl RtmClientBuilder<HasHandshake, HasConnector> {
    pub fn build(self) -> Result<ClientConfig> {
        let (Some(handshake), Some(connector)) = (self.handshake, self.connector) else {
            return Err(RtmError::Configuration(
                "handshake provider and connector are required".to_string(),
            ));
        };
        let settings = self.settings;

        if settings.outbound_capacity == 0 {
            return Err(RtmError::Configuration(
                "outbound capacity must be greater than zero".to_string(),
            ));
        }
        if settings.consumer_capacity == 0 {
            return Err(RtmError::Configuration(
                "consumer capacity must be greater than zero".to_string(),
            ));
        }
        if settings.heartbeat_interval == Some(Duration::ZERO) {
            return Err(RtmError::Configuration(
                "heartbeat interval must be greater than zero".to_string(),
            ));
        }

        Ok(ClientConfig {
            handshake,
            connector,
            handshake_policy: settings
                .handshake_policy
                .unwrap_or_else(|| Arc::new(FixedDelay::new(DEFAULT_HANDSHAKE_RETRY, None))),
            write_policy: settings.write_policy.unwrap_or_else(|| {
                Arc::new(ExponentialBackoff::new(
                    DEFAULT_WRITE_BACKOFF_INITIAL,
                    DEFAULT_WRITE_BACKOFF_MAX,
                    None,
                ))
            }),
            read_policy: settings.read_policy.unwrap_or_else(|| {
                Arc::new(ExponentialBackoff::escalating(
                    DEFAULT_READ_BACKOFF_INITIAL,
                    DEFAULT_READ_BACKOFF_CEILING,
                ))
            }),
            heartbeat_interval: settings.heartbeat_interval,
            reconnect_delay: settings.reconnect_delay,
            outbound_capacity: settings.outbound_capacity,
            consumer_capacity: settings.consumer_capacity,
            overflow: settings.overflow,
            consumers: Mutex::new(settings.consumers),
            shutdown: settings.shutdown.unwrap_or_default(),
        })
    }

    /// Build the configuration and start the client
    ///
    /// Returns once the first session is connected.
    pub async fn start(self) -> Result<RtmClient> {
        RtmClient::start(self.build()?).await
    }
}
