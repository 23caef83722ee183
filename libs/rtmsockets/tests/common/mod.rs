//! Common test utilities for rtmsockets integration tests
//!
//! - [`ScriptedHandshake`]: handshake provider with numbered, distinguishable directories
//! - [`MockConnector`] / [`MockSocket`]: in-memory sockets the test drives frame by frame
//! - [`MockWsServer`]: a real WebSocket server for end-to-end runs through tokio-tungstenite

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rtmsockets::handshake::{ConversationRecord, HandshakeResponse, SelfInfo};
use rtmsockets::states::{HasConnector, HasHandshake};
use rtmsockets::*;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub const WAIT: Duration = Duration::from_secs(3);

/// Route library logs to the test output when TEST_VERBOSE is set
pub fn init_test_tracing() {
    if std::env::var("TEST_VERBOSE").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("rtmsockets=debug")
            .try_init();
    }
}

/// Directory contents for the `n`th successful handshake
///
/// Every generation has `C1` (#general) plus one channel unique to it,
/// `C<n>00`, so tests can tell which handshake a directory came from.
pub fn handshake_response(n: usize, url: &str) -> HandshakeResponse {
    let channel = |id: String, name: String| ConversationRecord {
        id,
        name,
        is_archived: false,
    };
    HandshakeResponse {
        ok: true,
        url: url.to_string(),
        self_info: SelfInfo {
            id: "UBOT".to_string(),
            name: "echo".to_string(),
        },
        users: vec![User {
            id: "U1".to_string(),
            name: "alice".to_string(),
            ..User::default()
        }],
        channels: vec![
            channel("C1".to_string(), "general".to_string()),
            channel(format!("C{}00", n), format!("generation-{}", n)),
        ],
        ims: vec![channel("D1".to_string(), "alice".to_string())],
        ..HandshakeResponse::default()
    }
}

/// Handshake provider that fails a configurable number of times first
#[derive(Clone)]
pub struct ScriptedHandshake {
    calls: Arc<AtomicUsize>,
    failures: usize,
    url: Option<String>,
}

impl ScriptedHandshake {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            failures: 0,
            url: None,
        }
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures,
            ..Self::new()
        }
    }

    /// Point every handshake at a fixed socket url
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HandshakeProvider for ScriptedHandshake {
    async fn handshake(&self) -> Result<HandshakeResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(RtmError::Handshake(format!("scripted failure {}", call)));
        }
        let n = call - self.failures;
        let url = self
            .url
            .clone()
            .unwrap_or_else(|| format!("mock://rtm/{}", n));
        Ok(handshake_response(n, &url))
    }
}

/// Test-side handle of one in-memory socket
pub struct MockSocket {
    pub url: String,
    inbound: Option<mpsc::UnboundedSender<FrameResult<String>>>,
    written: mpsc::UnboundedReceiver<String>,
    /// Number of upcoming writes that fail with a transient error
    pub fail_writes: Arc<AtomicUsize>,
}

impl MockSocket {
    /// Deliver a frame to the client's reader
    pub fn push(&self, frame: serde_json::Value) {
        self.push_raw(Ok(frame.to_string()));
    }

    pub fn push_raw(&self, frame: FrameResult<String>) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(frame);
        }
    }

    /// Simulate the server closing the socket
    pub fn close(&mut self) {
        self.inbound = None;
    }

    /// Next frame the client wrote, parsed
    pub async fn next_written(&mut self) -> serde_json::Value {
        let frame = tokio::time::timeout(WAIT, self.written.recv())
            .await
            .expect("timed out waiting for an outbound frame")
            .expect("writer dropped");
        serde_json::from_str(&frame).expect("outbound frame is JSON")
    }

    /// Next written frame that is not a heartbeat
    pub async fn next_message(&mut self) -> serde_json::Value {
        loop {
            let frame = self.next_written().await;
            if frame["type"] != "ping" {
                return frame;
            }
        }
    }

    pub fn try_next_written(&mut self) -> Option<serde_json::Value> {
        self.written
            .try_recv()
            .ok()
            .map(|frame| serde_json::from_str(&frame).expect("outbound frame is JSON"))
    }
}

struct MockReader {
    inbound: mpsc::UnboundedReceiver<FrameResult<String>>,
}

#[async_trait]
impl FrameReader for MockReader {
    async fn read_frame(&mut self) -> FrameResult<String> {
        match self.inbound.recv().await {
            Some(frame) => frame,
            None => Err(TransportError::fatal("closed")),
        }
    }
}

struct MockWriter {
    written: mpsc::UnboundedSender<String>,
    fail_writes: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameWriter for MockWriter {
    async fn write_frame(&mut self, frame: &str) -> FrameResult<()> {
        let failing = self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::transient("write buffer full"));
        }
        self.written
            .send(frame.to_string())
            .map_err(|_| TransportError::fatal("test dropped socket"))
    }

    async fn close(&mut self) {}
}

/// Connector handing out [`MockSocket`]s
pub struct MockConnector {
    sockets: mpsc::UnboundedSender<MockSocket>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockSocket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sockets: tx }, rx)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<(Box<dyn FrameWriter>, Box<dyn FrameReader>)> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (written_tx, written_rx) = mpsc::unbounded_channel();
        let fail_writes = Arc::new(AtomicUsize::new(0));

        let socket = MockSocket {
            url: url.to_string(),
            inbound: Some(inbound_tx),
            written: written_rx,
            fail_writes: Arc::clone(&fail_writes),
        };
        self.sockets
            .send(socket)
            .map_err(|_| RtmError::SocketFatal("test stopped accepting sockets".to_string()))?;

        Ok((
            Box::new(MockWriter {
                written: written_tx,
                fail_writes,
            }),
            Box::new(MockReader {
                inbound: inbound_rx,
            }),
        ))
    }
}

/// Builder with millisecond-scale retry timings and no heartbeat
pub fn fast_builder(
    handshake: ScriptedHandshake,
    connector: MockConnector,
) -> RtmClientBuilder<HasHandshake, HasConnector> {
    init_test_tracing();
    RtmClient::builder()
        .handshake(handshake)
        .connector(connector)
        .handshake_policy(FixedDelay::new(Duration::from_millis(10), None))
        .write_policy(ExponentialBackoff::new(
            Duration::from_millis(1),
            Duration::from_millis(4),
            None,
        ))
        .read_policy(ExponentialBackoff::escalating(
            Duration::from_millis(1),
            Duration::from_millis(16),
        ))
        .reconnect_delay(Duration::from_millis(10))
        .no_heartbeat()
}

pub async fn next_socket(sockets: &mut mpsc::UnboundedReceiver<MockSocket>) -> MockSocket {
    tokio::time::timeout(WAIT, sockets.recv())
        .await
        .expect("timed out waiting for a socket")
        .expect("connector dropped")
}

pub async fn recv_event(rx: &mut mpsc::Receiver<Event>) -> Event {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an inbound event")
        .expect("consumer channel closed")
}

/// Poll `condition` until it holds or [`WAIT`] passes
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Wait for a lifecycle event matching `predicate`, skipping others
pub async fn wait_for_client_event(
    client: &RtmClient,
    mut predicate: impl FnMut(&ClientEvent) -> bool,
) -> Option<ClientEvent> {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        while let Some(event) = client.try_recv_event() {
            verbose_println!("  client event: {:?}", event);
            if predicate(&event) {
                return Some(event);
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    None
}

/// A real WebSocket server
///
/// Sends `{"type":"hello"}` on every new connection and echoes text
/// frames back. Records the `Origin` header of each upgrade request.
pub struct MockWsServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    kick: Arc<Notify>,
    origins: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
}

impl MockWsServer {
    /// Create and start a new mock WebSocket server
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let kick = Arc::new(Notify::new());
        let origins = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let server = Self {
            addr,
            shutdown: Arc::clone(&shutdown),
            kick: Arc::clone(&kick),
            origins: Arc::clone(&origins),
            connections: Arc::clone(&connections),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                connections.fetch_add(1, Ordering::SeqCst);
                                let shutdown = Arc::clone(&shutdown);
                                let kick = Arc::clone(&kick);
                                let origins = Arc::clone(&origins);
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, shutdown, kick, origins).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown.notified() => {
                        break;
                    }
                }
            }
        });

        server
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        shutdown: Arc<Notify>,
        kick: Arc<Notify>,
        origins: Arc<Mutex<Vec<String>>>,
    ) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::accept_hdr_async;
        use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
        use tokio_tungstenite::tungstenite::Message;

        let record_origin = |request: &Request,
                             response: Response|
         -> std::result::Result<Response, ErrorResponse> {
            if let Some(origin) = request.headers().get("Origin") {
                origins
                    .lock()
                    .push(origin.to_str().unwrap_or_default().to_string());
            }
            Ok(response)
        };

        let ws_stream = match accept_hdr_async(stream, record_origin).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();
        if write
            .send(Message::Text(r#"{"type":"hello"}"#.to_string()))
            .await
            .is_err()
        {
            return;
        }

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(msg)) => {
                            if msg.is_text() {
                                // Echo the frame back
                                if write.send(msg).await.is_err() {
                                    break;
                                }
                            } else if msg.is_close() {
                                break;
                            }
                        }
                        Some(Err(_)) | None => break,
                    }
                }
                _ = kick.notified() => {
                    let _ = write.close().await;
                    break;
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Close every open connection, leaving the listener up
    pub fn kick_clients(&self) {
        self.kick.notify_waiters();
    }

    pub fn origins(&self) -> Vec<String> {
        self.origins.lock().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
