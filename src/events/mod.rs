//! Inbound event decoding and fan-out.
//!
//! - `envelope`: the decoded `{type, payload}` unit and the typed `EventKind` view.
//! - `dispatcher`: per-domain registry of handlers with isolated, ordered delivery.

/// Handler registry and delivery
pub mod dispatcher;
/// Decoded event envelopes
pub mod envelope;

pub use dispatcher::{
    DispatchOutcome, DispatchStats, EventDispatcher, EventHandler, Subscription, WILDCARD,
};
pub use envelope::{EventKind, MessageEnvelope};
