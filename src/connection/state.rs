//! Connection state and counters.
//!
//! The connection task is the only writer. Handles read the state through a
//! `watch` channel and the counters through [`ConnectionStats`] snapshots.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Lifecycle state of the realtime connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Created, never connected
    Idle,
    /// An attempt is in flight
    Connecting,
    /// Transport open; heartbeat running
    Open,
    /// Client-initiated close in progress
    Closing,
    /// Closed by the client, or reconnect attempts exhausted
    Closed,
    /// Waiting for the backoff timer before the next attempt
    Reconnecting,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to an outbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the open transport
    Sent,
    /// Discarded because the connection was not open; counted in
    /// [`ConnectionStats::dropped_sends`]
    Dropped,
}

/// Snapshot of connection counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub attempts_started: u64,
    pub opened: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub heartbeats_sent: u64,
    pub dropped_sends: u64,
    pub unexpected_closes: u64,
    /// Reconnect attempts ran out; only an explicit `connect()` clears this
    pub exhausted: bool,
}

/// Counters shared between the connection task and its handles
/// Exhausted flag, observable through `watch` receivers
#[derive(Debug)]
struct ExhaustedFlag(watch::Sender<bool>);

impl Default for ExhaustedFlag {
    fn default() -> Self {
        Self(watch::Sender::new(false))
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCollector {
    attempts_started: AtomicU64,
    opened: AtomicU64,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    heartbeats_sent: AtomicU64,
    dropped_sends: AtomicU64,
    unexpected_closes: AtomicU64,
    exhausted: ExhaustedFlag,
}

impl StatsCollector {
    pub(crate) fn record_attempt(&self) {
        self.attempts_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_open(&self) {
        self.opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_send(&self) {
        self.dropped_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unexpected_close(&self) {
        self.unexpected_closes.fetch_add(1, Ordering::Relaxed);
    }

    /// Receivers only wake when the flag actually flips.
    pub(crate) fn set_exhausted(&self, exhausted: bool) {
        self.exhausted.0.send_if_modified(|current| {
            let changed = *current != exhausted;
            *current = exhausted;
            changed
        });
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        *self.exhausted.0.borrow()
    }

    pub(crate) fn watch_exhausted(&self) -> watch::Receiver<bool> {
        self.exhausted.0.subscribe()
    }

    pub(crate) fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            attempts_started: self.attempts_started.load(Ordering::Relaxed),
            opened: self.opened.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            dropped_sends: self.dropped_sends.load(Ordering::Relaxed),
            unexpected_closes: self.unexpected_closes.load(Ordering::Relaxed),
            exhausted: self.is_exhausted(),
        }
    }
}
