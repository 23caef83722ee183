//! Heartbeat keep-alive
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  Heartbeat Task     │
//! │  (one per socket)   │
//! │                     │
//! │  Every X interval:  │
//! │  1. Wait for tick   │
//! │  2. try_enqueue ────┼──> OutboundQueue ──> Writer task ──> socket
//! │  3. Repeat          │
//! └─────────────────────┘
//! ```
//!
//! The heartbeat never waits on the outbound queue. If the queue is full the
//! beat is skipped, so a stalled writer cannot pile up pings.

use crate::core::outbound::OutboundQueue;
use crate::model::Event;
use crate::traits::RtmError;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Periodically queue a `ping` event until cancelled
///
/// The first beat fires one full interval after start. Missed ticks are
/// skipped rather than bursted.
pub async fn heartbeat_task(interval: Duration, outbound: OutboundQueue, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    debug!("Heartbeat task started with interval: {:?}", interval);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Heartbeat task cancelled");
                break;
            }
            _ = ticker.tick() => {}
        }

        match outbound.try_enqueue(Event::heartbeat()) {
            Ok(()) => debug!("Heartbeat queued"),
            Err(RtmError::ChannelSend(_)) => debug!("Outbound queue full, skipping heartbeat"),
            Err(e) => {
                debug!("Outbound queue unavailable ({}), stopping heartbeat", e);
                break;
            }
        }
    }

    debug!("Heartbeat task exiting");
}

/// Spawn a heartbeat task bound to a socket generation
pub fn spawn_heartbeat(
    interval: Duration,
    outbound: OutboundQueue,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(heartbeat_task(interval, outbound, cancel))
}
