//! Session manager
//!
//! Owns the handshake, the live socket generation and the reconnect loop.
//!
//! ```text
//!  start() ──> establish ──> Connected ⇄ Degraded
//!                 ▲               │ fatal read / retries exhausted
//!                 │               ▼
//!                 └────────── Reconnecting
//!                                 │ shutdown
//!                                 ▼
//!                             Terminated
//! ```
//!
//! Each generation runs one reader, one writer and (optionally) one
//! heartbeat task under a child of the client's shutdown token. The
//! supervisor joins all three before it installs the next session, so two
//! generations never touch the outbound queue at once.

use crate::config::ClientConfig;
use crate::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::core::fanout::ConsumerRegistry;
use crate::core::heartbeat::spawn_heartbeat;
use crate::core::inbound::{run_reader, InboundContext, ReaderExit};
use crate::core::outbound::{run_writer, OutboundContext, OutboundQueue, WriterExit};
use crate::core::reactions::{ReactionCallback, ReactionRegistry};
use crate::model::{Directory, Event, Session};
use crate::traits::*;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle notifications from the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A session is live (generation number)
    Connected(u64),
    /// The socket of the current session died
    Disconnected(String),
    /// A new handshake is starting (reconnect number)
    Reconnecting(u64),
    /// A handshake or socket open attempt failed and will be retried
    HandshakeFailed(String),
    /// The client stopped for good
    Terminated,
}

/// Client metrics snapshot
#[derive(Debug, Clone)]
pub struct Metrics {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub reconnect_count: u64,
    pub decode_failures: u64,
    pub heartbeats_dropped: u64,
    pub events_abandoned: u64,
    pub write_retries: u64,
    pub read_retries: u64,
    pub connection_state: ConnectionState,
}

/// State shared by the client handle and the supervisor
struct Shared {
    config: ClientConfig,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
    session: RwLock<Option<Arc<Session>>>,
    generations: AtomicU64,
    consumers: Arc<ConsumerRegistry>,
    reactions: Arc<ReactionRegistry>,
    outbound: OutboundQueue,
    events: Sender<ClientEvent>,
}

impl Shared {
    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn install(&self, session: Arc<Session>) {
        info!(
            "Session {} connected as {} ({} users, {} conversations)",
            session.id,
            session.self_id,
            session.directory.user_count(),
            session.directory.conversation_count()
        );
        let id = session.id;
        *self.session.write() = Some(session);
        self.state.set(ConnectionState::Connected);
        self.emit(ClientEvent::Connected(id));
    }
}

/// A handshaken session plus its freshly opened socket
struct Generation {
    session: Arc<Session>,
    writer: Box<dyn FrameWriter>,
    reader: Box<dyn FrameReader>,
}

/// Real-time messaging client
///
/// Keeps one session alive at a time, reconnecting on fatal socket errors
/// until [`shutdown`](Self::shutdown) is called. Consumers, the reaction
/// registry and the outbound queue outlive individual sessions.
pub struct RtmClient {
    shared: Arc<Shared>,
    event_rx: Receiver<ClientEvent>,
    supervisor: Option<JoinHandle<()>>,
}

impl RtmClient {
    pub fn builder() -> crate::builder::RtmClientBuilder<
        crate::builder::states::NoHandshake,
        crate::builder::states::NoConnector,
    > {
        crate::builder::RtmClientBuilder::new()
    }

    /// Start the client and wait for the first session
    ///
    /// Handshake failures are retried per the handshake policy. Fails only
    /// when shutdown is requested first or a bounded policy runs out.
    pub async fn start(mut config: ClientConfig) -> Result<Self> {
        let consumers = Arc::new(ConsumerRegistry::new(
            config.consumer_capacity,
            config.overflow,
        ));
        for (name, sink) in config.consumers.get_mut().drain(..) {
            consumers.register_boxed(name, sink);
        }

        let (outbound, queue) = OutboundQueue::channel(config.outbound_capacity);
        let (event_tx, event_rx) = unbounded();

        let shared = Arc::new(Shared {
            config,
            state: Arc::new(AtomicConnectionState::new(ConnectionState::Handshaking)),
            metrics: Arc::new(AtomicMetrics::new()),
            session: RwLock::new(None),
            generations: AtomicU64::new(0),
            consumers,
            reactions: Arc::new(ReactionRegistry::new()),
            outbound,
            events: event_tx,
        });

        let first = match establish(&shared).await {
            Ok(generation) => generation,
            Err(e) => {
                error!("Could not start session: {}", e);
                shared.state.set(ConnectionState::Terminated);
                shared.emit(ClientEvent::Terminated);
                shared.consumers.shutdown().await;
                return Err(e);
            }
        };
        shared.install(Arc::clone(&first.session));

        let supervisor = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                supervise(shared, first, queue).await;
            })
        };

        Ok(Self {
            shared,
            event_rx,
            supervisor: Some(supervisor),
        })
    }

    /// The current session, if one has been established
    pub fn session(&self) -> Option<Arc<Session>> {
        self.shared.session.read().clone()
    }

    /// Directory snapshot of the current session
    pub fn directory(&self) -> Option<Arc<Directory>> {
        self.shared
            .session
            .read()
            .as_ref()
            .map(|session| Arc::clone(&session.directory))
    }

    /// Queue an outbound event, waiting only while the queue is full
    pub async fn send(&self, event: Event) -> Result<()> {
        self.shared.outbound.enqueue(event).await
    }

    /// Queue an outbound event without waiting
    pub fn try_send(&self, event: Event) -> Result<()> {
        self.shared.outbound.try_enqueue(event)
    }

    pub async fn send_message(
        &self,
        channel: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<()> {
        self.shared.outbound.send_message(channel, text).await
    }

    /// Queue a keep-alive ping outside the heartbeat schedule
    pub async fn ping(&self) -> Result<()> {
        self.shared.outbound.enqueue(Event::heartbeat()).await
    }

    /// Producer handle for consumers that reply to events
    pub fn outbound(&self) -> OutboundQueue {
        self.shared.outbound.clone()
    }

    pub fn register_sink(&self, name: impl Into<String>, sink: impl EventSink) {
        self.shared.consumers.register(name, sink);
    }

    pub fn register_channel(&self, name: impl Into<String>, sender: mpsc::Sender<Event>) {
        self.shared.consumers.register(name, sender);
    }

    pub fn register_callback<F>(&self, name: impl Into<String>, callback: F)
    where
        F: FnMut(Event) + Send + 'static,
    {
        self.shared.consumers.register_callback(name, callback);
    }

    /// Remove a consumer; returns whether it existed
    pub fn unregister(&self, name: &str) -> bool {
        self.shared.consumers.unregister(name)
    }

    pub fn consumer_names(&self) -> Vec<String> {
        self.shared.consumers.names()
    }

    /// Events a consumer lost to queue overflow
    pub fn consumer_dropped(&self, name: &str) -> Option<u64> {
        self.shared.consumers.dropped(name)
    }

    /// Run `callback` whenever a reaction to message `(channel, ts)` arrives
    pub fn add_reaction_callback<F>(
        &self,
        channel: impl Into<String>,
        ts: impl Into<String>,
        callback: F,
    ) where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.shared.reactions.register(channel, ts, callback);
    }

    pub fn remove_reaction_callback(&self, channel: &str, ts: &str) {
        self.shared.reactions.unregister(channel, ts);
    }

    pub fn reaction_callback(&self, channel: &str, ts: &str) -> Option<ReactionCallback> {
        self.shared.reactions.fetch(channel, ts)
    }

    pub fn reactions(&self) -> &Arc<ReactionRegistry> {
        &self.shared.reactions
    }

    #[inline]
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.shared.state.is_connected()
    }

    pub fn metrics(&self) -> Metrics {
        let metrics = &self.shared.metrics;
        Metrics {
            frames_sent: metrics.frames_sent(),
            frames_received: metrics.frames_received(),
            reconnect_count: metrics.reconnect_count(),
            decode_failures: metrics.decode_failures(),
            heartbeats_dropped: metrics.heartbeats_dropped(),
            events_abandoned: metrics.events_abandoned(),
            write_retries: metrics.write_retries(),
            read_retries: metrics.read_retries(),
            connection_state: self.shared.state.get(),
        }
    }

    /// Try to receive a lifecycle event (non-blocking)
    pub fn try_recv_event(&self) -> Option<ClientEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receive a lifecycle event (blocking)
    pub fn recv_event(&self) -> std::result::Result<ClientEvent, crossbeam_channel::RecvError> {
        self.event_rx.recv()
    }

    /// Token that stops the client when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shared.config.shutdown.clone()
    }

    /// Stop reconnecting, close the socket and drain every consumer
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down RTM client");
        self.shared.config.shutdown.cancel();

        if let Some(handle) = self.supervisor.take() {
            if let Err(e) = handle.await {
                error!("Supervisor task failed: {}", e);
            }
        }

        debug!("Waiting for {} consumers to drain", self.shared.consumers.len());
        self.shared.consumers.shutdown().await;

        info!("RTM client shut down");
        Ok(())
    }
}

impl Drop for RtmClient {
    fn drop(&mut self) {
        if self.supervisor.is_some() {
            self.shared.config.shutdown.cancel();
        }
    }
}

/// Handshake and open a socket, retrying per the handshake policy
async fn establish(shared: &Shared) -> Result<Generation> {
    let shutdown = &shared.config.shutdown;
    let mut attempt = 0;

    loop {
        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(RtmError::Shutdown),
            result = try_establish(shared) => result,
        };

        let e = match result {
            Ok(generation) => return Ok(generation),
            Err(e) => e,
        };

        warn!("Session setup failed: {}", e);
        shared.emit(ClientEvent::HandshakeFailed(e.to_string()));

        match shared.config.handshake_policy.next_delay(attempt) {
            Some(delay) => {
                info!("Retrying handshake in {:?} (attempt {})", delay, attempt + 1);
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => return Err(RtmError::Shutdown),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            None => {
                return Err(RtmError::HandshakeExhausted {
                    attempts: attempt + 1,
                    reason: e.to_string(),
                });
            }
        }
    }
}

async fn try_establish(shared: &Shared) -> Result<Generation> {
    let response = shared.config.handshake.handshake().await?;
    response.ensure_ok()?;

    let directory = Arc::new(Directory::from_handshake(&response));
    let id = shared.generations.fetch_add(1, Ordering::Relaxed) + 1;
    let session = Arc::new(Session {
        id,
        socket_url: response.url,
        self_id: response.self_info.id,
        directory,
    });

    debug!("Opening socket for session {}: {}", id, session.socket_url);
    let (writer, reader) = shared.config.connector.connect(&session.socket_url).await?;

    Ok(Generation {
        session,
        writer,
        reader,
    })
}

/// Run generations back to back until shutdown
async fn supervise(shared: Arc<Shared>, first: Generation, queue: mpsc::Receiver<Event>) {
    let shutdown = shared.config.shutdown.clone();
    let mut generation = first;
    let mut queue = queue;
    let mut pending: Option<Event> = None;

    loop {
        let cancel = shutdown.child_token();
        let session = Arc::clone(&generation.session);

        let writer = tokio::spawn(run_writer(
            generation.writer,
            queue,
            pending.take(),
            OutboundContext {
                session: Arc::clone(&session),
                policy: Arc::clone(&shared.config.write_policy),
                metrics: Arc::clone(&shared.metrics),
            },
            cancel.clone(),
        ));

        let heartbeat = shared
            .config
            .heartbeat_interval
            .map(|interval| spawn_heartbeat(interval, shared.outbound.clone(), cancel.clone()));

        let reader = tokio::spawn(run_reader(
            generation.reader,
            InboundContext {
                session_id: session.id,
                policy: Arc::clone(&shared.config.read_policy),
                consumers: Arc::clone(&shared.consumers),
                reactions: Arc::clone(&shared.reactions),
                state: Arc::clone(&shared.state),
                metrics: Arc::clone(&shared.metrics),
            },
            cancel.clone(),
        ));

        let exit = match reader.await {
            Ok(exit) => exit,
            Err(e) => {
                error!("Reader task for session {} failed: {}", session.id, e);
                ReaderExit::Reconnect(e.to_string())
            }
        };

        // Tear the generation down completely before touching the next one
        cancel.cancel();
        if let Some(heartbeat) = heartbeat {
            let _ = heartbeat.await;
        }
        let WriterExit {
            queue: returned,
            pending: carried,
        } = match writer.await {
            Ok(exit) => exit,
            Err(e) => {
                error!("Writer task for session {} failed: {}", session.id, e);
                break;
            }
        };
        queue = returned;
        pending = carried;

        let reason = match exit {
            ReaderExit::Cancelled => break,
            ReaderExit::Reconnect(reason) => reason,
        };
        if shutdown.is_cancelled() {
            break;
        }

        warn!("Session {} lost: {}", session.id, reason);
        shared.state.set(ConnectionState::Reconnecting);
        shared.emit(ClientEvent::Disconnected(reason));
        if pending.is_some() {
            debug!("Carrying one unsent event into the next session");
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(shared.config.reconnect_delay) => {}
        }

        shared.metrics.increment_reconnects();
        shared.emit(ClientEvent::Reconnecting(shared.metrics.reconnect_count()));

        generation = match establish(&shared).await {
            Ok(next) => next,
            Err(e) => {
                error!("Giving up on reconnect: {}", e);
                break;
            }
        };
        shared.install(Arc::clone(&generation.session));
    }

    shared.state.set(ConnectionState::Terminated);
    shared.emit(ClientEvent::Terminated);
    info!("Session supervisor exiting");
}
