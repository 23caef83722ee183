//! Outbound pipeline
//!
//! # Architecture
//!
//! ```text
//! producers (consumers, heartbeat, RtmClient::send)
//!        │  OutboundQueue (bounded mpsc, survives reconnects)
//!        ▼
//! ┌───────────────────────┐
//! │  Writer task          │  one per socket generation
//! │  1. recv next event   │
//! │  2. stamp sequence id │
//! │  3. write, retry w/   │
//! │     backoff on error  │
//! └───────────────────────┘
//! ```
//!
//! Write failures never trigger a reconnect; only the reader decides that.
//! Heartbeats are never retried.

use crate::core::connection_state::AtomicMetrics;
use crate::model::{Directory, Event, Session};
use crate::traits::{FrameWriter, Result, RetryPolicy, RtmError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Producer handle for the outbound queue
///
/// Cheap to clone; every clone feeds the same single writer.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    tx: mpsc::Sender<Event>,
}

impl OutboundQueue {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue an event, waiting only while the queue is full
    pub async fn enqueue(&self, event: Event) -> Result<()> {
        self.tx.send(event).await.map_err(|_| RtmError::Shutdown)
    }

    /// Queue an event without waiting
    pub fn try_enqueue(&self, event: Event) -> Result<()> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                RtmError::ChannelSend("outbound queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => RtmError::Shutdown,
        })
    }

    /// Queue a chat message for a conversation
    pub async fn send_message(
        &self,
        channel: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<()> {
        self.enqueue(Event::message(channel, text)).await
    }
}

/// What the writer hands back when its generation ends
pub(crate) struct WriterExit {
    pub queue: mpsc::Receiver<Event>,
    /// Event caught mid-retry, to be re-sent by the next generation
    pub pending: Option<Event>,
}

pub(crate) struct OutboundContext {
    pub session: Arc<Session>,
    pub policy: Arc<dyn RetryPolicy>,
    pub metrics: Arc<AtomicMetrics>,
}

enum WriteOutcome {
    Written,
    Dropped,
    Cancelled,
}

/// Assign the per-conversation sequence id; unscoped events get 0
pub(crate) fn stamp(event: &mut Event, directory: &Directory) {
    event.id = match event.conversation() {
        Some(conversation) => directory.next_sequence(conversation),
        None => 0,
    };
}

/// Drain the queue onto one socket until cancelled
pub(crate) async fn run_writer(
    mut writer: Box<dyn FrameWriter>,
    mut queue: mpsc::Receiver<Event>,
    mut pending: Option<Event>,
    ctx: OutboundContext,
    cancel: CancellationToken,
) -> WriterExit {
    debug!("Writer started for session {}", ctx.session.id);

    loop {
        let mut event = match pending.take() {
            Some(event) => event,
            None => tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = queue.recv() => match next {
                    Some(event) => event,
                    None => {
                        debug!("Outbound queue closed");
                        break;
                    }
                },
            },
        };

        stamp(&mut event, &ctx.session.directory);
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Dropping outbound event that failed to encode: {}", e);
                ctx.metrics.increment_abandoned();
                continue;
            }
        };

        match write_with_retry(writer.as_mut(), &event, &frame, &ctx, &cancel).await {
            WriteOutcome::Written | WriteOutcome::Dropped => {}
            WriteOutcome::Cancelled => {
                if !event.is_heartbeat() {
                    pending = Some(event);
                }
                break;
            }
        }
    }

    if tokio::time::timeout(CLOSE_TIMEOUT, writer.close()).await.is_err() {
        debug!("Socket close timed out");
    }
    debug!("Writer exiting for session {}", ctx.session.id);

    WriterExit { queue, pending }
}

async fn write_with_retry(
    writer: &mut dyn FrameWriter,
    event: &Event,
    frame: &str,
    ctx: &OutboundContext,
    cancel: &CancellationToken,
) -> WriteOutcome {
    let mut attempt = 0;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return WriteOutcome::Cancelled,
            result = writer.write_frame(frame) => result,
        };

        let e = match result {
            Ok(()) => {
                ctx.metrics.increment_sent();
                return WriteOutcome::Written;
            }
            Err(e) => e,
        };

        if event.is_heartbeat() {
            warn!("Heartbeat write failed ({}), dropping it", e);
            ctx.metrics.increment_heartbeats_dropped();
            return WriteOutcome::Dropped;
        }

        match ctx.policy.next_delay(attempt) {
            Some(delay) => {
                warn!(
                    "Write of {} event {} failed ({}), retrying in {:?} (attempt {})",
                    event.kind,
                    event.id,
                    e,
                    delay,
                    attempt + 1
                );
                ctx.metrics.increment_write_retries();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return WriteOutcome::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            None => {
                error!(
                    "Abandoning {} event {} after {} attempts: {}",
                    event.kind,
                    event.id,
                    attempt + 1,
                    e
                );
                ctx.metrics.increment_abandoned();
                return WriteOutcome::Dropped;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::{ConversationRecord, HandshakeResponse};
    use crate::traits::{ExponentialBackoff, FrameResult, TransportError};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Fails the first `failures` writes, then records frames
    struct FlakyWriter {
        failures: usize,
        written: Arc<Mutex<Vec<serde_json::Value>>>,
    }

    #[async_trait]
    impl FrameWriter for FlakyWriter {
        async fn write_frame(&mut self, frame: &str) -> FrameResult<()> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(TransportError::transient("buffer full"));
            }
            self.written.lock().push(serde_json::from_str(frame).unwrap());
            Ok(())
        }

        async fn close(&mut self) {}
    }

    fn session() -> Arc<Session> {
        let response = HandshakeResponse {
            ok: true,
            url: "wss://example.test".to_string(),
            channels: vec![
                ConversationRecord {
                    id: "C1".to_string(),
                    name: "general".to_string(),
                    is_archived: false,
                },
                ConversationRecord {
                    id: "C2".to_string(),
                    name: "random".to_string(),
                    is_archived: false,
                },
            ],
            ..HandshakeResponse::default()
        };
        Arc::new(Session {
            id: 1,
            socket_url: response.url.clone(),
            self_id: "U0".to_string(),
            directory: Arc::new(Directory::from_handshake(&response)),
        })
    }

    fn context(metrics: Arc<AtomicMetrics>) -> OutboundContext {
        OutboundContext {
            session: session(),
            policy: Arc::new(ExponentialBackoff::new(
                Duration::from_millis(1),
                Duration::from_millis(4),
                None,
            )),
            metrics,
        }
    }

    async fn drive(
        failures: usize,
        events: Vec<Event>,
    ) -> (Vec<serde_json::Value>, Arc<AtomicMetrics>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let writer = FlakyWriter {
            failures,
            written: Arc::clone(&written),
        };
        let metrics = Arc::new(AtomicMetrics::new());
        let (queue, rx) = OutboundQueue::channel(16);
        for event in events {
            queue.enqueue(event).await.unwrap();
        }
        drop(queue);

        let exit = run_writer(
            Box::new(writer),
            rx,
            None,
            context(Arc::clone(&metrics)),
            CancellationToken::new(),
        )
        .await;
        assert!(exit.pending.is_none());

        let frames = written.lock().clone();
        (frames, metrics)
    }

    #[tokio::test]
    async fn test_sequence_ids_are_per_conversation() {
        let (frames, _) = drive(
            0,
            vec![
                Event::message("C1", "a"),
                Event::message("C2", "b"),
                Event::message("C1", "c"),
                Event::heartbeat(),
                Event::message("C1", "d"),
            ],
        )
        .await;

        let ids: Vec<(Option<&str>, u64)> = frames
            .iter()
            .map(|f| (f["channel"].as_str(), f["id"].as_u64().unwrap()))
            .collect();
        assert_eq!(
            ids,
            vec![
                (Some("C1"), 1),
                (Some("C2"), 1),
                (Some("C1"), 2),
                (None, 0),
                (Some("C1"), 3)
            ]
        );
    }

    #[tokio::test]
    async fn test_retried_send_keeps_its_sequence_id() {
        let (frames, metrics) = drive(3, vec![Event::message("C1", "a"), Event::message("C1", "b")]).await;

        let ids: Vec<u64> = frames.iter().map(|f| f["id"].as_u64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(metrics.write_retries(), 3);
        assert_eq!(metrics.frames_sent(), 2);
    }

    #[tokio::test]
    async fn test_failed_heartbeat_is_dropped_not_retried() {
        let (frames, metrics) = drive(1, vec![Event::heartbeat(), Event::heartbeat()]).await;

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "ping");
        assert_eq!(metrics.heartbeats_dropped(), 1);
        assert_eq!(metrics.write_retries(), 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_retry_returns_pending_event() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let writer = FlakyWriter {
            failures: usize::MAX,
            written: Arc::clone(&written),
        };
        let (queue, rx) = OutboundQueue::channel(4);
        queue.enqueue(Event::message("C1", "stuck")).await.unwrap();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_writer(
            Box::new(writer),
            rx,
            None,
            context(Arc::new(AtomicMetrics::new())),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        let exit = handle.await.unwrap();

        let pending = exit.pending.expect("event should be carried over");
        assert_eq!(pending.text.as_deref(), Some("stuck"));
        assert!(written.lock().is_empty());
    }

    #[tokio::test]
    async fn test_try_enqueue_reports_full_queue() {
        let (queue, _rx) = OutboundQueue::channel(1);
        queue.try_enqueue(Event::heartbeat()).unwrap();

        let err = queue.try_enqueue(Event::heartbeat()).unwrap_err();
        assert!(matches!(err, RtmError::ChannelSend(_)));
    }
}
