use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::{debug, trace};

use crate::{
    error::SyncError,
    events::{EventHandler, EventKind, MessageEnvelope},
};

/// Stale signal names understood by the wallet's cache layer
pub mod signals {
    pub const BALANCE: &str = "balance";
    pub const PACKETS: &str = "packets";
    pub const MESSAGES: &str = "messages";
    pub const NOTIFICATIONS: &str = "notifications";
}

/// External cache layer that refetches data behind a signal name
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, signal: &str);
}

/// Invalidation counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationStats {
    pub events_handled: u64,
    pub signals_fired: u64,
    pub forced_refreshes: u64,
    pub ignored_events: u64,
}

#[derive(Debug, Default)]
struct StatsCollector {
    events_handled: AtomicU64,
    signals_fired: AtomicU64,
    forced_refreshes: AtomicU64,
    ignored_events: AtomicU64,
}

impl StatsCollector {
    fn snapshot(&self) -> InvalidationStats {
        InvalidationStats {
            events_handled: self.events_handled.load(Ordering::Relaxed),
            signals_fired: self.signals_fired.load(Ordering::Relaxed),
            forced_refreshes: self.forced_refreshes.load(Ordering::Relaxed),
            ignored_events: self.ignored_events.load(Ordering::Relaxed),
        }
    }
}

/// Marks cached data stale when the server reports a change.
pub struct CacheInvalidationAdapter {
    table: HashMap<String, Vec<String>>,
    cache: Arc<dyn CacheInvalidator>,
    stats: StatsCollector,
}

impl CacheInvalidationAdapter {
    /// Adapter with the default event-to-signal table.
    pub fn new(cache: Arc<dyn CacheInvalidator>) -> Self {
        Self::empty(cache)
            .with_mapping(EventKind::BalanceUpdate, [signals::BALANCE])
            .with_mapping(EventKind::PacketClaimed, [signals::PACKETS, signals::BALANCE])
            .with_mapping(EventKind::PacketCreated, [signals::PACKETS, signals::BALANCE])
            .with_mapping(EventKind::NewMessage, [signals::MESSAGES])
            .with_mapping(EventKind::Notification, [signals::NOTIFICATIONS])
    }

    pub fn empty(cache: Arc<dyn CacheInvalidator>) -> Self {
        Self {
            table: HashMap::new(),
            cache,
            stats: StatsCollector::default(),
        }
    }

    /// Add signals for an event kind. Signals already mapped are not repeated.
    pub fn with_mapping<S>(
        mut self,
        kind: impl Into<EventKind>,
        names: impl IntoIterator<Item = S>,
    ) -> Self
    where
        S: Into<String>,
    {
        let entry = self
            .table
            .entry(kind.into().as_str().to_string())
            .or_default();
        for signal in names {
            let signal = signal.into();
            if !entry.contains(&signal) {
                entry.push(signal);
            }
        }
        self
    }

    /// Signals mapped to `event_type`, in table order.
    pub fn signals_for(&self, event_type: &str) -> &[String] {
        self.table
            .get(event_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Invalidate every signal mapped to the envelope's kind. Returns how many fired.
    pub fn handle(&self, envelope: &MessageEnvelope) -> usize {
        let signals = self.signals_for(&envelope.event_type);
        if signals.is_empty() {
            self.stats.ignored_events.fetch_add(1, Ordering::Relaxed);
            trace!("No cache signals for {}", envelope.event_type);
            return 0;
        }

        self.stats.events_handled.fetch_add(1, Ordering::Relaxed);
        for signal in signals {
            debug!("Invalidating {} after {}", signal, envelope.event_type);
            self.cache.invalidate(signal);
        }
        self.stats
            .signals_fired
            .fetch_add(signals.len() as u64, Ordering::Relaxed);
        signals.len()
    }

    /// Invalidate `signal` without a server event, e.g. on pull-to-refresh.
    pub fn force_refresh(&self, signal: &str) {
        debug!("Forced refresh of {}", signal);
        self.cache.invalidate(signal);
        self.stats.forced_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> InvalidationStats {
        self.stats.snapshot()
    }
}

impl EventHandler for CacheInvalidationAdapter {
    fn handle(&self, envelope: &MessageEnvelope) -> Result<(), SyncError> {
        CacheInvalidationAdapter::handle(self, envelope);
        Ok(())
    }

    fn name(&self) -> &str {
        "cache-invalidation"
    }
}
