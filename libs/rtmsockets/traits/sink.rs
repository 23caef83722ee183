//! Consumer sinks
//!
//! Every registered consumer gets its own bounded delivery queue and its own
//! delivery task that feeds a sink:
//!
//! ```text
//! Socket → Reader → decode → ┬→ queue "audit"  → delivery task → AuditSink
//!                            ├→ queue "echo"   → delivery task → callback
//!                            └→ queue "ui"     → delivery task → mpsc::Sender
//!                                   ↑
//!                         (each consumer isolated)
//! ```
//!
//! # Ordering Guarantees
//!
//! - **Per-Consumer Sequential**: a sink sees events in socket arrival order
//! - **Cross-Consumer Parallel**: a slow sink never delays another sink

use crate::model::Event;
use crate::{Result, RtmError};
use async_trait::async_trait;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Destination for inbound events
///
/// Implementations run on the consumer's dedicated delivery task, so they
/// may take their time; only their own queue backs up.
///
/// # Errors
/// `RtmError::ConsumerGone` stops the delivery task. Any other error is
/// logged and delivery continues with the next event.
#[async_trait]
pub trait EventSink: Send + 'static {
    async fn deliver(&mut self, event: Event) -> Result<()>;
}

#[async_trait]
impl EventSink for tokio::sync::mpsc::Sender<Event> {
    async fn deliver(&mut self, event: Event) -> Result<()> {
        self.send(event)
            .await
            .map_err(|_| RtmError::ConsumerGone("receiver dropped".to_string()))
    }
}

#[async_trait]
impl EventSink for tokio::sync::mpsc::UnboundedSender<Event> {
    async fn deliver(&mut self, event: Event) -> Result<()> {
        self.send(event)
            .map_err(|_| RtmError::ConsumerGone("receiver dropped".to_string()))
    }
}

/// Sink that runs a plain function for every event
///
/// Bookkeeping frames (no type, `error`, `pong`) are skipped. A panic in the
/// function is caught and reported as a consumer error.
pub struct CallbackSink<F> {
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: FnMut(Event) + Send + 'static,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> EventSink for CallbackSink<F>
where
    F: FnMut(Event) + Send + 'static,
{
    async fn deliver(&mut self, event: Event) -> Result<()> {
        if !event.is_user_facing() {
            return Ok(());
        }

        let callback = &mut self.callback;
        catch_unwind(AssertUnwindSafe(|| callback(event)))
            .map_err(|_| RtmError::Consumer("callback panicked".to_string()))
    }
}
