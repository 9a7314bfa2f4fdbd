//! Public handle to the connection task.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::debug;

use super::{
    actor::{Command, ConnectionActor},
    state::{ConnectionState, ConnectionStats, SendOutcome, StatsCollector},
    token::TokenProvider,
};
use crate::{
    config::SyncConfig,
    error::{SyncError, SyncResult},
    events::EventDispatcher,
    transport::{Connector, WebSocketConnector},
};

/// Owns the single realtime connection.
///
/// Cheap to clone; all clones drive the same task. Inbound frames are handed
/// to every registered [`EventDispatcher`] in registration order.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    stats: Arc<StatsCollector>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .finish()
    }
}

impl ConnectionManager {
    pub fn builder(config: SyncConfig) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new(config)
    }

    /// Validate `config` and spawn the connection task on the current Tokio runtime.
    pub fn spawn(
        config: SyncConfig,
        connector: Arc<dyn Connector>,
        dispatchers: Vec<Arc<EventDispatcher>>,
    ) -> SyncResult<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| SyncError::config("connection must be created inside a Tokio runtime"))?;

        let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let stats = Arc::new(StatsCollector::default());

        let actor = ConnectionActor::new(
            Arc::new(config),
            connector,
            dispatchers,
            command_rx,
            state_tx,
            stats.clone(),
        );
        let task = runtime.spawn(actor.run());

        Ok(Self {
            commands: command_tx,
            state: state_rx,
            stats,
            task: Arc::new(Mutex::new(Some(task))),
        })
    }

    /// Open the connection, fetching a token from `provider` for this and every retry.
    ///
    /// Resolves when the connection is Open, or fails once reconnect attempts
    /// run out or `disconnect()` is called first. Calling this while an
    /// attempt is in flight joins that attempt; calling it while Open
    /// returns immediately.
    pub async fn connect(&self, provider: Arc<dyn TokenProvider>) -> SyncResult<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Connect { provider, reply })
            .await
            .map_err(|_| SyncError::ActorGone)?;
        rx.await.map_err(|_| SyncError::ActorGone)?
    }

    /// Close the connection with the client close code and cancel any pending retry.
    pub async fn disconnect(&self, reason: &str) {
        let (reply, rx) = oneshot::channel();
        let command = Command::Disconnect {
            reason: reason.to_string(),
            reply,
        };
        if self.commands.send(command).await.is_err() {
            debug!("Disconnect requested after the connection task stopped");
            return;
        }
        let _ = rx.await;
    }

    /// Write a text frame if Open; otherwise the frame is dropped and counted.
    pub async fn send(&self, frame: impl Into<String>) -> SendOutcome {
        let (reply, rx) = oneshot::channel();
        let command = Command::Send {
            frame: frame.into(),
            reply,
        };
        if self.commands.send(command).await.is_err() {
            self.stats.record_dropped_send();
            return SendOutcome::Dropped;
        }
        rx.await.unwrap_or(SendOutcome::Dropped)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Reconnect attempts ran out since the last explicit `connect()`.
    pub fn is_exhausted(&self) -> bool {
        self.stats.is_exhausted()
    }

    /// Receiver for the exhausted flag.
    ///
    /// `watch_state()` reports Closed both after `disconnect()` and after
    /// retries run out; this one only flips for the latter, and clears on
    /// the next successful open or explicit `connect()`.
    pub fn watch_exhausted(&self) -> watch::Receiver<bool> {
        self.stats.watch_exhausted()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats.snapshot()
    }

    /// Close the connection and stop the task. Later calls on any clone fail
    /// with [`SyncError::ActorGone`] or drop their frame.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Builder for [`ConnectionManager`]
pub struct ConnectionManagerBuilder {
    config: SyncConfig,
    connector: Option<Arc<dyn Connector>>,
    dispatchers: Vec<Arc<EventDispatcher>>,
}

impl ConnectionManagerBuilder {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            connector: None,
            dispatchers: Vec::new(),
        }
    }

    /// Use a custom transport. Defaults to [`WebSocketConnector`].
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Register a dispatcher to receive inbound frames
    pub fn with_dispatcher(mut self, dispatcher: Arc<EventDispatcher>) -> Self {
        self.dispatchers.push(dispatcher);
        self
    }

    pub fn build(self) -> SyncResult<ConnectionManager> {
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WebSocketConnector::new()));
        ConnectionManager::spawn(self.config, connector, self.dispatchers)
    }
}
