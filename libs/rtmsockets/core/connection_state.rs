//! Lock-free session state and counters

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Session lifecycle state
///
/// ```text
/// Handshaking → Connected ⇄ Degraded
///                   ↓
///              Reconnecting → Connected …
///                   ↓
///              Terminated (explicit shutdown only)
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial handshake / socket open in progress
    Handshaking = 0,
    /// Socket open, reader/writer/heartbeat running
    Connected = 1,
    /// Connected, but the reader is backing off after transient errors
    Degraded = 2,
    /// Old socket torn down, new handshake in progress
    Reconnecting = 3,
    /// Shut down for good
    Terminated = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Handshaking,
            1 => ConnectionState::Connected,
            2 => ConnectionState::Degraded,
            3 => ConnectionState::Reconnecting,
            _ => ConnectionState::Terminated,
        }
    }
}

/// Atomic wrapper around [`ConnectionState`]
#[derive(Debug)]
pub struct AtomicConnectionState {
    inner: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            inner: AtomicU8::new(state as u8),
        }
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: ConnectionState) {
        self.inner.store(state as u8, Ordering::Release);
    }

    /// Transition only if the current state matches `current`
    pub fn compare_exchange(
        &self,
        current: ConnectionState,
        new: ConnectionState,
    ) -> Result<ConnectionState, ConnectionState> {
        self.inner
            .compare_exchange(current as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(ConnectionState::from_u8)
            .map_err(ConnectionState::from_u8)
    }

    /// Connected or degraded: a socket is live
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self.get(), ConnectionState::Connected | ConnectionState::Degraded)
    }

    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.get() == ConnectionState::Degraded
    }

    /// Handshaking or reconnecting
    #[inline]
    pub fn is_handshaking(&self) -> bool {
        matches!(self.get(), ConnectionState::Handshaking | ConnectionState::Reconnecting)
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.get() == ConnectionState::Terminated
    }
}

/// Atomic counters shared by all session tasks
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    reconnects: AtomicU64,
    decode_failures: AtomicU64,
    heartbeats_dropped: AtomicU64,
    events_abandoned: AtomicU64,
    write_retries: AtomicU64,
    read_retries: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_decode_failures(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_heartbeats_dropped(&self) {
        self.heartbeats_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_abandoned(&self) {
        self.events_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_write_retries(&self) {
        self.write_retries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_read_retries(&self) {
        self.read_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    pub fn heartbeats_dropped(&self) -> u64 {
        self.heartbeats_dropped.load(Ordering::Relaxed)
    }

    pub fn events_abandoned(&self) -> u64 {
        self.events_abandoned.load(Ordering::Relaxed)
    }

    pub fn write_retries(&self) -> u64 {
        self.write_retries.load(Ordering::Relaxed)
    }

    pub fn read_retries(&self) -> u64 {
        self.read_retries.load(Ordering::Relaxed)
    }
}
