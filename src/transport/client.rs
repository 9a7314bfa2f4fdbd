//!
//! WebSocket transport backed by tokio-tungstenite.
//!
//! `WebSocketConnector` opens the socket and splits it into a [`FrameSink`] for
//! outbound text frames and an [`EventStream`] that reports inbound frames,
//! socket errors, and the close. Protocol-level ping/pong frames are answered
//! by tungstenite and never surface here.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::borrow::Cow;
use tokio::net::TcpStream;
use tokio_tungstenite::{
	MaybeTlsStream, WebSocketStream, connect_async,
	tungstenite::{
		Message,
		protocol::{CloseFrame, frame::coding::CloseCode},
	},
};
use tracing::{debug, warn};
use url::Url;

use super::types::{Connector, EventStream, FrameSink, Link, TransportEvent};
use crate::error::SyncError;

type WsSender = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Opens real WebSocket connections
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
	pub fn new() -> Self {
		Self
	}
}

#[async_trait]
impl Connector for WebSocketConnector {
	async fn connect(&self, url: &Url) -> Result<Link, SyncError> {
		debug!(
			"Attempting WebSocket connection to {}://{}{}",
			url.scheme(),
			url.host_str().unwrap_or(""),
			url.path()
		);

		let (ws_stream, response) = connect_async(url.as_str()).await?;
		debug!(
			"WebSocket connection established, response status: {}",
			response.status()
		);

		let (ws_sender, ws_receiver) = ws_stream.split();

		let events = ws_receiver.filter_map(|msg| async move {
			match msg {
				Ok(Message::Text(text)) => Some(TransportEvent::Frame(text)),
				Ok(Message::Binary(data)) => match String::from_utf8(data) {
					Ok(text) => Some(TransportEvent::Frame(text)),
					Err(e) => {
						warn!("Dropping non UTF-8 binary frame: {}", e);
						None
					}
				},
				Ok(Message::Close(frame)) => Some(match frame {
					Some(frame) => TransportEvent::Closed {
						code: Some(u16::from(frame.code)),
						reason: frame.reason.into_owned(),
					},
					None => TransportEvent::Closed {
						code: None,
						reason: String::new(),
					},
				}),
				// Control frames are handled inside tungstenite
				Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
				Err(e) => Some(TransportEvent::Error(e.to_string())),
			}
		});

		Ok(Link {
			sink: Box::new(WebSocketSink { sender: ws_sender }),
			events: Box::pin(events) as EventStream,
		})
	}
}

struct WebSocketSink {
	sender: WsSender,
}

#[async_trait]
impl FrameSink for WebSocketSink {
	async fn send_text(&mut self, text: String) -> Result<(), SyncError> {
		self.sender.send(Message::Text(text)).await?;
		Ok(())
	}

	async fn close(&mut self, code: u16, reason: &str) -> Result<(), SyncError> {
		let frame = CloseFrame {
			code: CloseCode::from(code),
			reason: Cow::Owned(reason.to_string()),
		};
		self.sender.send(Message::Close(Some(frame))).await?;
		Ok(())
	}
}
