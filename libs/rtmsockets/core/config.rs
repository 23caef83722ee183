use crate::core::fanout::OverflowPolicy;
use crate::traits::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_HANDSHAKE_RETRY: Duration = Duration::from_secs(60);
pub const DEFAULT_WRITE_BACKOFF_INITIAL: Duration = Duration::from_secs(1);
pub const DEFAULT_WRITE_BACKOFF_MAX: Duration = Duration::from_secs(60);
pub const DEFAULT_READ_BACKOFF_INITIAL: Duration = Duration::from_secs(1);
pub const DEFAULT_READ_BACKOFF_CEILING: Duration = Duration::from_secs(30);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;
pub const DEFAULT_CONSUMER_CAPACITY: usize = 256;

/// Configuration for [`RtmClient`](crate::core::session::RtmClient)
///
/// Built through the type-state builder, which guarantees a handshake
/// provider and a connector are present.
pub struct ClientConfig {
    /// Performs the authenticating handshake on every (re)connect
    pub(crate) handshake: Arc<dyn HandshakeProvider>,

    /// Opens the socket returned by the handshake
    pub(crate) connector: Arc<dyn Connector>,

    /// Delay between failed handshakes (flat by default)
    pub(crate) handshake_policy: Arc<dyn RetryPolicy>,

    /// Delay between failed writes of the same event
    pub(crate) write_policy: Arc<dyn RetryPolicy>,

    /// Delay between transient read errors; `None` escalates to a reconnect
    pub(crate) read_policy: Arc<dyn RetryPolicy>,

    /// Keep-alive interval, `None` disables the heartbeat
    pub(crate) heartbeat_interval: Option<Duration>,

    /// Pause between tearing down a socket and the next handshake
    pub(crate) reconnect_delay: Duration,

    pub(crate) outbound_capacity: usize,
    pub(crate) consumer_capacity: usize,
    pub(crate) overflow: OverflowPolicy,

    /// Consumers registered before the first session starts, taken by `start`
    pub(crate) consumers: Mutex<Vec<(String, Box<dyn EventSink>)>>,

    /// Cancelled to stop the client; each socket generation uses a child token
    pub(crate) shutdown: CancellationToken,
}

impl ClientConfig {
    pub fn has_heartbeat(&self) -> bool {
        self.heartbeat_interval.is_some()
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    pub fn outbound_capacity(&self) -> usize {
        self.outbound_capacity
    }

    pub fn consumer_capacity(&self) -> usize {
        self.consumer_capacity
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow
    }

    /// Number of consumers registered through the builder
    pub fn consumer_count(&self) -> usize {
        self.consumers.lock().len()
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}
