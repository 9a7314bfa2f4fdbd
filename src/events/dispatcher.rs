//! Fan-out of decoded events to registered handlers.
//!
//! An `EventDispatcher` owns a registry of handlers keyed by event type. Each
//! inbound frame is decoded once and then delivered, synchronously and in
//! registration order, to every handler registered for its type and to every
//! wildcard handler. A handler that returns an error or panics is logged and
//! skipped; the remaining handlers still run.

use serde::Serialize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, error, warn};

use super::envelope::MessageEnvelope;
use crate::error::SyncError;
use crate::transport::{Keepalive, is_keepalive};

/// Event key that matches every event type.
pub const WILDCARD: &str = "*";

/// Trait for handling dispatched events.
///
/// Closures of the right shape implement it, so most callers go through
/// [`EventDispatcher::subscribe`]; stateful consumers implement it directly
/// and register with [`EventDispatcher::subscribe_handler`].
pub trait EventHandler: Send + Sync {
    /// Handle one envelope. Errors are logged by the dispatcher.
    fn handle(&self, envelope: &MessageEnvelope) -> Result<(), SyncError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "anonymous"
    }
}

impl<F> EventHandler for F
where
    F: Fn(&MessageEnvelope) -> Result<(), SyncError> + Send + Sync,
{
    fn handle(&self, envelope: &MessageEnvelope) -> Result<(), SyncError> {
        self(envelope)
    }
}

struct Registration {
    id: u64,
    key: String,
    handler: Arc<dyn EventHandler>,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    entries: Mutex<Vec<Registration>>,
}

impl Registry {
    fn entries(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, key: String, handler: Arc<dyn EventHandler>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries().push(Registration { id, key, handler });
        id
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|registration| registration.id != id);
        entries.len() != before
    }

    /// Snapshot the handlers for `event_type` so none run under the lock.
    fn matching(&self, event_type: &str) -> Vec<Arc<dyn EventHandler>> {
        self.entries()
            .iter()
            .filter(|registration| registration.key == event_type || registration.key == WILDCARD)
            .map(|registration| registration.handler.clone())
            .collect()
    }
}

/// Handle for one registration.
///
/// Dropping it, or calling [`Subscription::unsubscribe`], removes exactly this
/// registration. Other handlers on the same key are unaffected.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: u64,
    event_key: String,
    registry: Weak<Registry>,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn event_key(&self) -> &str {
        &self.event_key
    }

    /// Remove the registration. Returns `false` if it was already gone.
    pub fn unsubscribe(mut self) -> bool {
        self.release()
    }

    /// Keep the registration for as long as the dispatcher lives.
    pub fn detach(mut self) {
        self.active = false;
    }

    fn release(&mut self) -> bool {
        if !std::mem::replace(&mut self.active, false) {
            return false;
        }
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event_key", &self.event_key)
            .field("active", &self.active)
            .finish()
    }
}

/// Result of dispatching one raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Keepalive frame, literal or typed; not an event
    Ignored,
    /// The frame could not be decoded and was dropped
    Undecodable,
    /// The frame was delivered; `failed` handlers returned an error or panicked
    Delivered { handlers: usize, failed: usize },
}

/// Dispatcher counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub frames_decoded: u64,
    pub decode_failures: u64,
    pub deliveries: u64,
    pub handler_failures: u64,
}

#[derive(Default)]
struct DispatchCounters {
    frames_decoded: AtomicU64,
    decode_failures: AtomicU64,
    deliveries: AtomicU64,
    handler_failures: AtomicU64,
}

/// Event dispatcher for one logical domain (e.g. account sync).
pub struct EventDispatcher {
    domain: String,
    registry: Arc<Registry>,
    counters: DispatchCounters,
}

impl EventDispatcher {
    /// Create a new, empty dispatcher.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            registry: Arc::new(Registry::default()),
            counters: DispatchCounters::default(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Register a callback for `event_key` (or [`WILDCARD`]).
    ///
    /// Handlers are called in the order they are registered.
    pub fn subscribe<F>(&self, event_key: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&MessageEnvelope) -> Result<(), SyncError> + Send + Sync + 'static,
    {
        self.subscribe_handler(event_key, Arc::new(callback))
    }

    /// Register a handler that may be shared with other owners.
    pub fn subscribe_handler(
        &self,
        event_key: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Subscription {
        let event_key = event_key.into();
        debug!(
            domain = %self.domain,
            key = %event_key,
            handler = handler.name(),
            "Registering subscriber"
        );
        let id = self.registry.insert(event_key.clone(), handler);
        Subscription {
            id,
            event_key,
            registry: Arc::downgrade(&self.registry),
            active: true,
        }
    }

    /// Number of registrations for exactly `event_key`.
    pub fn subscriber_count(&self, event_key: &str) -> usize {
        self.registry
            .entries()
            .iter()
            .filter(|registration| registration.key == event_key)
            .count()
    }

    /// Decode a raw text frame and deliver it.
    ///
    /// Never fails: decode errors are logged and the frame is dropped.
    pub fn dispatch(&self, raw: &str) -> DispatchOutcome {
        if is_keepalive(raw) {
            return DispatchOutcome::Ignored;
        }

        match MessageEnvelope::decode(raw) {
            Ok(envelope) if Keepalive::from_type(&envelope.event_type).is_some() => {
                DispatchOutcome::Ignored
            }
            Ok(envelope) => {
                self.counters.frames_decoded.fetch_add(1, Ordering::Relaxed);
                self.dispatch_envelope(&envelope)
            }
            Err(e) => {
                self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!(domain = %self.domain, "Dropping undecodable frame: {}", e);
                DispatchOutcome::Undecodable
            }
        }
    }

    /// Deliver an already decoded envelope to every matching handler.
    pub fn dispatch_envelope(&self, envelope: &MessageEnvelope) -> DispatchOutcome {
        let handlers = self.registry.matching(&envelope.event_type);
        let mut failed = 0;

        for handler in &handlers {
            let result = catch_unwind(AssertUnwindSafe(|| handler.handle(envelope)));
            let failure = match result {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(panic) => Some(panic_message(panic.as_ref())),
            };

            match failure {
                None => {
                    self.counters.deliveries.fetch_add(1, Ordering::Relaxed);
                }
                Some(reason) => {
                    failed += 1;
                    self.counters.handler_failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        domain = %self.domain,
                        event_type = %envelope.event_type,
                        "Handler {} failed to process event: {}",
                        handler.name(),
                        reason
                    );
                    // Continue processing with other handlers
                }
            }
        }

        if handlers.is_empty() {
            debug!(
                domain = %self.domain,
                event_type = %envelope.event_type,
                "No subscribers for event"
            );
        }

        DispatchOutcome::Delivered {
            handlers: handlers.len(),
            failed,
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            frames_decoded: self.counters.frames_decoded.load(Ordering::Relaxed),
            decode_failures: self.counters.decode_failures.load(Ordering::Relaxed),
            deliveries: self.counters.deliveries.load(Ordering::Relaxed),
            handler_failures: self.counters.handler_failures.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("domain", &self.domain)
            .field("stats", &self.stats())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
