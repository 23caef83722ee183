//! Inbound pipeline
//!
//! One reader task per socket generation. Each frame is decoded, normalized,
//! pushed to every consumer queue and finally offered to the reaction
//! registry.
//!
//! Read failures are split by [`FailureClass`](crate::traits::FailureClass):
//! fatal ones end the generation at once, transient ones are retried with an
//! escalating backoff and become fatal when the policy gives up. The session
//! sits in `Degraded` while those retries are running.

use crate::core::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::core::fanout::ConsumerRegistry;
use crate::core::reactions::ReactionRegistry;
use crate::model::Event;
use crate::traits::{FrameReader, RetryPolicy};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why a reader stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReaderExit {
    /// The socket is unusable; the session has to be re-established
    Reconnect(String),
    /// The generation was cancelled from outside
    Cancelled,
}

pub(crate) struct InboundContext {
    pub session_id: u64,
    pub policy: Arc<dyn RetryPolicy>,
    pub consumers: Arc<ConsumerRegistry>,
    pub reactions: Arc<ReactionRegistry>,
    pub state: Arc<AtomicConnectionState>,
    pub metrics: Arc<AtomicMetrics>,
}

pub(crate) async fn run_reader(
    mut reader: Box<dyn FrameReader>,
    ctx: InboundContext,
    cancel: CancellationToken,
) -> ReaderExit {
    debug!("Reader started for session {}", ctx.session_id);
    let mut attempt = 0;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ReaderExit::Cancelled,
            result = reader.read_frame() => result,
        };

        let e = match result {
            Ok(frame) => {
                if attempt > 0 {
                    info!("Socket read recovered after {} retries", attempt);
                    attempt = 0;
                    let _ = ctx
                        .state
                        .compare_exchange(ConnectionState::Degraded, ConnectionState::Connected);
                }
                ctx.metrics.increment_received();

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return ReaderExit::Cancelled,
                    _ = handle_frame(&frame, &ctx) => {}
                }
                continue;
            }
            Err(e) => e,
        };

        if e.is_fatal() {
            warn!("Socket read failed: {}", e);
            return ReaderExit::Reconnect(e.to_string());
        }

        match ctx.policy.next_delay(attempt) {
            Some(delay) => {
                if attempt == 0 {
                    let _ = ctx
                        .state
                        .compare_exchange(ConnectionState::Connected, ConnectionState::Degraded);
                }
                warn!(
                    "Transient read error ({}), retrying in {:?} (attempt {})",
                    e,
                    delay,
                    attempt + 1
                );
                ctx.metrics.increment_read_retries();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return ReaderExit::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            None => {
                error!(
                    "Read still failing after {} retries, treating as fatal: {}",
                    attempt, e
                );
                return ReaderExit::Reconnect(format!("read retries exhausted: {}", e));
            }
        }
    }
}

async fn handle_frame(frame: &str, ctx: &InboundContext) {
    let event = match Event::decode(frame) {
        Ok(event) => event,
        Err(e) => {
            warn!("Dropping undecodable frame: {}", e);
            ctx.metrics.increment_decode_failures();
            return;
        }
    };

    ctx.consumers.dispatch(&event).await;

    let reactions = &ctx.reactions;
    if catch_unwind(AssertUnwindSafe(|| reactions.trigger(&event))).is_err() {
        error!(
            "Reaction callback panicked for {:?}/{:?}",
            event.channel, event.ts
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fanout::OverflowPolicy;
    use crate::traits::{ExponentialBackoff, FrameResult, TransportError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Plays back a script, then reports the socket closed
    struct ScriptedReader {
        script: VecDeque<FrameResult<String>>,
    }

    impl ScriptedReader {
        fn new(script: Vec<FrameResult<String>>) -> Box<Self> {
            Box::new(Self {
                script: script.into(),
            })
        }
    }

    #[async_trait]
    impl FrameReader for ScriptedReader {
        async fn read_frame(&mut self) -> FrameResult<String> {
            self.script
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::fatal("closed")))
        }
    }

    fn frame(text: &str) -> FrameResult<String> {
        Ok(format!(
            r#"{{"type":"message","channel":"C1","text":"{}","ts":"1.0"}}"#,
            text
        ))
    }

    fn transient() -> TransportError {
        TransportError::transient("would block")
    }

    fn context() -> (InboundContext, mpsc::UnboundedReceiver<Event>) {
        let consumers = Arc::new(ConsumerRegistry::new(16, OverflowPolicy::DropOldest));
        let (tx, rx) = mpsc::unbounded_channel();
        consumers.register("probe", tx);

        let ctx = InboundContext {
            session_id: 1,
            policy: Arc::new(ExponentialBackoff::escalating(
                Duration::from_millis(1),
                Duration::from_millis(16),
            )),
            consumers,
            reactions: Arc::new(ReactionRegistry::new()),
            state: Arc::new(AtomicConnectionState::new(ConnectionState::Connected)),
            metrics: Arc::new(AtomicMetrics::new()),
        };
        (ctx, rx)
    }

    #[tokio::test]
    async fn test_transient_errors_recover() {
        let (ctx, mut rx) = context();
        let metrics = Arc::clone(&ctx.metrics);
        let state = Arc::clone(&ctx.state);
        let reader = ScriptedReader::new(vec![
            frame("one"),
            Err(transient()),
            Err(transient()),
            frame("two"),
        ]);

        let exit = run_reader(reader, ctx, CancellationToken::new()).await;

        assert_eq!(exit, ReaderExit::Reconnect("fatal: closed".to_string()));
        assert_eq!(rx.recv().await.unwrap().text.as_deref(), Some("one"));
        assert_eq!(rx.recv().await.unwrap().text.as_deref(), Some("two"));
        assert_eq!(metrics.read_retries(), 2);
        assert_eq!(state.get(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_transient_errors_escalate() {
        let (ctx, _rx) = context();
        let state = Arc::clone(&ctx.state);
        let metrics = Arc::clone(&ctx.metrics);
        let script = (0..10).map(|_| Err(transient())).collect();

        let exit = run_reader(ScriptedReader::new(script), ctx, CancellationToken::new()).await;

        assert!(matches!(exit, ReaderExit::Reconnect(reason) if reason.contains("exhausted")));
        // 1, 2, 4, 8, 16 ms, then the next delay would pass the ceiling
        assert_eq!(metrics.read_retries(), 5);
        assert_eq!(state.get(), ConnectionState::Degraded);
    }

    #[tokio::test]
    async fn test_decode_failure_drops_frame_only() {
        let (ctx, mut rx) = context();
        let metrics = Arc::clone(&ctx.metrics);
        let reader = ScriptedReader::new(vec![Ok("not json".to_string()), frame("after")]);

        run_reader(reader, ctx, CancellationToken::new()).await;

        assert_eq!(rx.recv().await.unwrap().text.as_deref(), Some("after"));
        assert_eq!(metrics.decode_failures(), 1);
        assert_eq!(metrics.frames_received(), 2);
    }

    #[tokio::test]
    async fn test_reaction_triggered_after_fanout() {
        let (ctx, mut rx) = context();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        ctx.reactions.register("C1", "42.0", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let reactions = Arc::clone(&ctx.reactions);
        let reader = ScriptedReader::new(vec![Ok(r#"{"type":"reaction_added","reaction":"eyes","item":{"type":"message","channel":"C1","ts":"42.0"}}"#.to_string())]);

        run_reader(reader, ctx, CancellationToken::new()).await;

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.channel.as_deref(), Some("C1"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(reactions.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_reader() {
        struct Silent;

        #[async_trait]
        impl FrameReader for Silent {
            async fn read_frame(&mut self) -> FrameResult<String> {
                std::future::pending().await
            }
        }

        let (ctx, _rx) = context();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_reader(Box::new(Silent), ctx, cancel.clone()));

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), ReaderExit::Cancelled);
    }
}
