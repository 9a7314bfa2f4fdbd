//! Transport layer for the realtime connection
//!
//! The connection task talks to sockets only through the [`Connector`] and
//! [`FrameSink`] traits. [`WebSocketConnector`] is the production
//! implementation; tests substitute an in-memory one.

/// tokio-tungstenite connector
mod client;
/// Transport traits, events, and wire constants
mod types;
/// Connection URI building
mod uri;

pub use client::WebSocketConnector;
pub use types::*;
pub use uri::{build_connect_url, redact};
