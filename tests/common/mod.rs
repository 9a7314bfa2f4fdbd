#![allow(dead_code)]

use async_trait::async_trait;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::time::Instant;
use url::Url;

use wallet_realtime_sync::{
    Alert, AlertSink, CacheInvalidator, Connector, SyncConfig, SyncError,
    logging::init_test_tracing,
    transport::{FrameSink, Link, TransportEvent},
};

/// How the next connect call behaves
#[derive(Debug, Clone)]
pub enum Behavior {
    Accept,
    Refuse,
    AcceptAfter(Duration),
    Hang,
}

/// What the client wrote to a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Written {
    Text(String),
    Close(u16, String),
}

/// Server side of one accepted link
#[derive(Clone)]
pub struct ServerEnd {
    written: Arc<Mutex<Vec<Written>>>,
    events: UnboundedSender<TransportEvent>,
}

impl ServerEnd {
    pub fn push(&self, frame: &str) {
        let _ = self
            .events
            .unbounded_send(TransportEvent::Frame(frame.to_string()));
    }

    pub fn close(&self, code: u16) {
        let _ = self.events.unbounded_send(TransportEvent::Closed {
            code: Some(code),
            reason: "server going away".to_string(),
        });
    }

    /// End the stream with no close frame
    pub fn drop_stream(&self) {
        self.events.close_channel();
    }

    pub fn written(&self) -> Vec<Written> {
        self.written.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.written()
            .into_iter()
            .filter_map(|w| match w {
                Written::Text(text) => Some(text),
                Written::Close(..) => None,
            })
            .collect()
    }
}

struct MockSink {
    written: Arc<Mutex<Vec<Written>>>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<(), SyncError> {
        self.written.lock().unwrap().push(Written::Text(text));
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), SyncError> {
        self.written
            .lock()
            .unwrap()
            .push(Written::Close(code, reason.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct MockState {
    script: VecDeque<Behavior>,
    fallback: Option<Behavior>,
    calls: Vec<(Instant, Url)>,
    servers: Vec<ServerEnd>,
}

/// In-memory connector driven by a script of behaviors
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue behaviors for the next connect calls
    pub fn script(&self, behaviors: impl IntoIterator<Item = Behavior>) {
        self.state.lock().unwrap().script.extend(behaviors);
    }

    /// Behavior once the script is used up; defaults to Accept
    pub fn otherwise(&self, behavior: Behavior) {
        self.state.lock().unwrap().fallback = Some(behavior);
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().calls.iter().map(|(t, _)| *t).collect()
    }

    pub fn urls(&self) -> Vec<Url> {
        self.state.lock().unwrap().calls.iter().map(|(_, u)| u.clone()).collect()
    }

    /// Gaps between consecutive connect calls, in ms
    pub fn gaps_ms(&self) -> Vec<u64> {
        self.call_times()
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis() as u64)
            .collect()
    }

    pub fn server(&self, index: usize) -> ServerEnd {
        self.state.lock().unwrap().servers[index].clone()
    }

    pub fn latest_server(&self) -> ServerEnd {
        self.state
            .lock()
            .unwrap()
            .servers
            .last()
            .cloned()
            .expect("no link accepted yet")
    }

    fn accept(&self) -> Link {
        let written = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = unbounded();
        self.state.lock().unwrap().servers.push(ServerEnd {
            written: written.clone(),
            events: tx,
        });
        Link {
            sink: Box::new(MockSink { written }),
            events: Box::pin(rx),
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &Url) -> Result<Link, SyncError> {
        let behavior = {
            let mut state = self.state.lock().unwrap();
            state.calls.push((Instant::now(), url.clone()));
            let fallback = state.fallback.clone().unwrap_or(Behavior::Accept);
            state.script.pop_front().unwrap_or(fallback)
        };

        match behavior {
            Behavior::Accept => Ok(self.accept()),
            Behavior::Refuse => Err(SyncError::Frame("connection refused".to_string())),
            Behavior::AcceptAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.accept())
            }
            Behavior::Hang => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub struct RecordingAlerts(Mutex<Vec<Alert>>);

impl RecordingAlerts {
    pub fn alerts(&self) -> Vec<Alert> {
        self.0.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlerts {
    fn render(&self, alert: &Alert) {
        self.0.lock().unwrap().push(alert.clone());
    }
}

#[derive(Default)]
pub struct RecordingCache(Mutex<Vec<String>>);

impl RecordingCache {
    pub fn signals(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl CacheInvalidator for RecordingCache {
    fn invalidate(&self, signal: &str) {
        self.0.lock().unwrap().push(signal.to_string());
    }
}

pub fn test_config() -> SyncConfig {
    init_test_tracing(tracing::Level::DEBUG);
    SyncConfig::new("api.example.test").with_reconnect(
        Duration::from_millis(1_000),
        Duration::from_millis(60_000),
        5,
    )
}

/// Let the connection task drain everything that is ready
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
