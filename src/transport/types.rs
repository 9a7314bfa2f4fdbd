//! Transport seam between the connection task and a concrete socket.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use url::Url;

use crate::error::SyncError;

/// Close code sent when the client closes the connection on purpose.
///
/// The client stops reading before it sends this, so every close that
/// arrives from the peer is unexpected, whatever its code.
pub const CLIENT_CLOSE_CODE: u16 = 1000;

/// Keepalive frame emitted by the heartbeat.
pub const KEEPALIVE_PING: &str = "ping";

/// Keepalive reply.
pub const KEEPALIVE_PONG: &str = "pong";

/// Keepalive frames, never domain events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keepalive {
	Ping,
	Pong,
}

impl Keepalive {
	pub fn from_type(event_type: &str) -> Option<Self> {
		match event_type {
			KEEPALIVE_PING => Some(Self::Ping),
			KEEPALIVE_PONG => Some(Self::Pong),
			_ => None,
		}
	}
}

#[derive(Deserialize)]
struct TypeOnly {
	#[serde(rename = "type")]
	kind: String,
}

/// Classify a text frame as a keepalive.
///
/// Matches the bare `"ping"`/`"pong"` literals and JSON objects whose `type`
/// is `ping` or `pong`.
pub fn keepalive(frame: &str) -> Option<Keepalive> {
	if let Some(literal) = Keepalive::from_type(frame) {
		return Some(literal);
	}
	if !frame.contains(KEEPALIVE_PING) && !frame.contains(KEEPALIVE_PONG) {
		return None;
	}
	serde_json::from_str::<TypeOnly>(frame)
		.ok()
		.and_then(|typed| Keepalive::from_type(&typed.kind))
}

pub fn is_keepalive(frame: &str) -> bool {
	keepalive(frame).is_some()
}

/// Events produced by the read half of a live transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
	/// A UTF-8 text frame
	Frame(String),
	/// A socket-level error; usually followed by a close
	Error(String),
	/// The peer or the network closed the socket
	Closed { code: Option<u16>, reason: String },
}

pub type EventStream = BoxStream<'static, TransportEvent>;

/// Write half of a live transport
#[async_trait]
pub trait FrameSink: Send {
	/// Send one text frame.
	async fn send_text(&mut self, text: String) -> Result<(), SyncError>;

	/// Send a close frame carrying `code` and `reason`.
	async fn close(&mut self, code: u16, reason: &str) -> Result<(), SyncError>;
}

/// A connected transport, split into its write and read halves.
pub struct Link {
	pub sink: Box<dyn FrameSink>,
	pub events: EventStream,
}

/// Opens transports.
///
/// Every successful call yields a new, independent transport object; the
/// connection task guarantees at most one is alive at a time.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
	async fn connect(&self, url: &Url) -> Result<Link, SyncError>;
}
