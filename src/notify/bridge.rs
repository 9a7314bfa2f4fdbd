use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::{debug, trace};

use super::types::{Alert, AlertSink, ForegroundProbe, Severity};
use crate::{
    error::SyncError,
    events::{EventHandler, EventKind, MessageEnvelope},
};

const MESSAGE_FIELDS: [&str; 3] = ["message", "content", "body"];

/// Counters for alerts rendered and suppressed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationStats {
    pub rendered: u64,
    /// Mapped events that arrived while in the background
    pub suppressed: u64,
    pub unmapped: u64,
}

/// Turns realtime events into in-app alerts while the app is in the foreground.
///
/// In the background nothing is rendered; an out-of-band push channel
/// informs the user instead.
pub struct NotificationBridge {
    rules: HashMap<String, Severity>,
    foreground: Arc<dyn ForegroundProbe>,
    sink: Arc<dyn AlertSink>,
    rendered: AtomicU64,
    suppressed: AtomicU64,
    unmapped: AtomicU64,
}

impl NotificationBridge {
    /// Bridge with the default severity table.
    pub fn new(foreground: Arc<dyn ForegroundProbe>, sink: Arc<dyn AlertSink>) -> Self {
        Self::empty(foreground, sink)
            .with_rule(EventKind::BalanceUpdate, Severity::Info)
            .with_rule(EventKind::PacketClaimed, Severity::Success)
            .with_rule(EventKind::PacketCreated, Severity::Success)
            .with_rule(EventKind::NewMessage, Severity::Info)
            .with_rule(EventKind::Notification, Severity::Info)
    }

    /// Bridge with no rules; every event is ignored until rules are added.
    pub fn empty(foreground: Arc<dyn ForegroundProbe>, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            rules: HashMap::new(),
            foreground,
            sink,
            rendered: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            unmapped: AtomicU64::new(0),
        }
    }

    /// Add or replace the severity for an event kind.
    pub fn with_rule(mut self, kind: impl Into<EventKind>, severity: Severity) -> Self {
        self.rules.insert(kind.into().as_str().to_string(), severity);
        self
    }

    /// Severity for `envelope`, or `None` if its kind is unmapped.
    pub fn severity_for(&self, envelope: &MessageEnvelope) -> Option<Severity> {
        let base = *self.rules.get(&envelope.event_type)?;
        if envelope.kind() != EventKind::Notification {
            return Some(base);
        }

        let level = envelope.text_field("level");
        Some(level.and_then(|l| l.parse().ok()).unwrap_or(base))
    }

    /// Render an alert for `envelope` if its kind is mapped and the app is in
    /// the foreground. Returns the rendered alert.
    pub fn handle(&self, envelope: &MessageEnvelope) -> Option<Alert> {
        let Some(severity) = self.severity_for(envelope) else {
            self.unmapped.fetch_add(1, Ordering::Relaxed);
            trace!("No alert rule for {}", envelope.event_type);
            return None;
        };

        if !self.foreground.is_foreground() {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            debug!("In background, not rendering alert for {}", envelope.event_type);
            return None;
        }

        let alert = build_alert(envelope, severity);
        self.sink.render(&alert);
        self.rendered.fetch_add(1, Ordering::Relaxed);
        Some(alert)
    }

    pub fn stats(&self) -> NotificationStats {
        NotificationStats {
            rendered: self.rendered.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            unmapped: self.unmapped.load(Ordering::Relaxed),
        }
    }
}

impl EventHandler for NotificationBridge {
    fn handle(&self, envelope: &MessageEnvelope) -> Result<(), SyncError> {
        NotificationBridge::handle(self, envelope);
        Ok(())
    }

    fn name(&self) -> &str {
        "notification-bridge"
    }
}

fn build_alert(envelope: &MessageEnvelope, severity: Severity) -> Alert {
    let title = envelope
        .text_field("title")
        .map(str::to_string)
        .unwrap_or_else(|| fallback_title(&envelope.kind()));
    let message = MESSAGE_FIELDS
        .iter()
        .find_map(|key| envelope.text_field(key))
        .unwrap_or_default()
        .to_string();

    Alert {
        severity,
        title,
        message,
        event_type: envelope.event_type.clone(),
    }
}

fn fallback_title(kind: &EventKind) -> String {
    match kind {
        EventKind::BalanceUpdate => "Balance updated".to_string(),
        EventKind::PacketClaimed => "Red packet claimed".to_string(),
        EventKind::PacketCreated => "Red packet sent".to_string(),
        EventKind::NewMessage => "New message".to_string(),
        EventKind::Notification => "Notification".to_string(),
        EventKind::Other(name) => name.clone(),
    }
}
