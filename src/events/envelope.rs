//! Decoded inbound events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SyncError;

/// Event types pushed by the server in this deployment.
///
/// Unrecognized discriminants are kept as [`EventKind::Other`] so new server
/// events flow through without a client release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    BalanceUpdate,
    PacketClaimed,
    PacketCreated,
    Notification,
    NewMessage,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::BalanceUpdate => "balance_update",
            EventKind::PacketClaimed => "packet_claimed",
            EventKind::PacketCreated => "packet_created",
            EventKind::Notification => "notification",
            EventKind::NewMessage => "new_message",
            EventKind::Other(s) => s,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        match s {
            "balance_update" => EventKind::BalanceUpdate,
            "packet_claimed" => EventKind::PacketClaimed,
            "packet_created" => EventKind::PacketCreated,
            "notification" => EventKind::Notification,
            "new_message" => EventKind::NewMessage,
            other => EventKind::Other(other.to_string()),
        }
    }
}

/// Wire shape of a JSON event frame: a `type` plus arbitrary sibling fields
#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

/// The decoded `{type, payload}` unit delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageEnvelope {
    /// The event discriminant, exactly as sent
    pub event_type: String,
    /// Every field of the frame except `type`
    pub payload: Value,
    /// When the frame was decoded locally
    pub received_at: DateTime<Utc>,
}

impl MessageEnvelope {
    /// Create an envelope stamped with the current time.
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            received_at: Utc::now(),
        }
    }

    /// Decode a text frame of the form `{"type": "...", ...}`.
    pub fn decode(raw: &str) -> Result<Self, SyncError> {
        let frame: RawFrame = serde_json::from_str(raw)?;
        Ok(Self::new(frame.event_type, Value::Object(frame.fields)))
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from(self.event_type.as_str())
    }

    /// Look up a string field in the payload, then in a nested `payload` object.
    ///
    /// Servers send both `{"type":..,"title":..}` and
    /// `{"type":..,"payload":{"title":..}}`.
    pub fn text_field(&self, key: &str) -> Option<&str> {
        self.payload
            .get(key)
            .and_then(Value::as_str)
            .or_else(|| {
                self.payload
                    .get("payload")
                    .and_then(|inner| inner.get(key))
                    .and_then(Value::as_str)
            })
    }
}
