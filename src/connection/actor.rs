//! The task that owns the transport.
//!
//! Every state change, timer and socket write happens inside
//! [`ConnectionActor::run`]. Handles talk to it through [`Command`]s, so two
//! concurrent `connect()` calls can never open two transports.

use futures::future::BoxFuture;
use futures_util::StreamExt;
use std::{pin::Pin, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{Instant, Interval, MissedTickBehavior, Sleep},
};
use tracing::{debug, error, info, warn};

use super::{
    reconnect::ReconnectPolicy,
    state::{ConnectionState, SendOutcome, StatsCollector},
    token::TokenProvider,
};
use crate::{
    config::SyncConfig,
    error::{SyncError, SyncResult},
    events::EventDispatcher,
    transport::{
        CLIENT_CLOSE_CODE, Connector, EventStream, FrameSink, KEEPALIVE_PING, KEEPALIVE_PONG,
        Keepalive, Link, TransportEvent, build_connect_url, keepalive, redact,
    },
};

type PendingAttempt = BoxFuture<'static, SyncResult<Link>>;

pub(crate) enum Command {
    Connect {
        provider: Arc<dyn TokenProvider>,
        reply: oneshot::Sender<SyncResult<()>>,
    },
    Disconnect {
        reason: String,
        reply: oneshot::Sender<()>,
    },
    Send {
        frame: String,
        reply: oneshot::Sender<SendOutcome>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct ConnectionActor {
    config: Arc<SyncConfig>,
    connector: Arc<dyn Connector>,
    dispatchers: Vec<Arc<EventDispatcher>>,
    commands: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    stats: Arc<StatsCollector>,
    state: ConnectionState,
    policy: ReconnectPolicy,
    provider: Option<Arc<dyn TokenProvider>>,
    waiters: Vec<oneshot::Sender<SyncResult<()>>>,
    attempt: Option<PendingAttempt>,
    sink: Option<Box<dyn FrameSink>>,
    events: Option<EventStream>,
    heartbeat: Option<Interval>,
    retry: Option<Pin<Box<Sleep>>>,
}

impl ConnectionActor {
    pub(crate) fn new(
        config: Arc<SyncConfig>,
        connector: Arc<dyn Connector>,
        dispatchers: Vec<Arc<EventDispatcher>>,
        commands: mpsc::Receiver<Command>,
        state_tx: watch::Sender<ConnectionState>,
        stats: Arc<StatsCollector>,
    ) -> Self {
        let policy = ReconnectPolicy::new(config.reconnect);
        Self {
            config,
            connector,
            dispatchers,
            commands,
            state_tx,
            stats,
            state: ConnectionState::Idle,
            policy,
            provider: None,
            waiters: Vec::new(),
            attempt: None,
            sink: None,
            events: None,
            heartbeat: None,
            retry: None,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("Connection task started for {}", self.config.host);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.teardown("client shutdown").await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All connection handles dropped");
                        self.teardown("client dropped").await;
                        break;
                    }
                },
                result = poll_attempt(&mut self.attempt) => self.on_attempt_finished(result),
                event = next_event(&mut self.events) => self.on_transport_event(event).await,
                _ = next_tick(&mut self.heartbeat) => self.send_heartbeat().await,
                _ = retry_elapsed(&mut self.retry) => self.on_retry_elapsed(),
            }
        }

        debug!("Connection task stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { provider, reply } => self.on_connect(provider, reply),
            Command::Disconnect { reason, reply } => {
                self.teardown(&reason).await;
                let _ = reply.send(());
            }
            Command::Send { frame, reply } => {
                let outcome = self.send_frame(frame).await;
                let _ = reply.send(outcome);
            }
            // Handled by the run loop
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn on_connect(
        &mut self,
        provider: Arc<dyn TokenProvider>,
        reply: oneshot::Sender<SyncResult<()>>,
    ) {
        match self.state {
            ConnectionState::Open => {
                let _ = reply.send(Ok(()));
            }
            ConnectionState::Connecting => {
                debug!("Connect requested while an attempt is in flight, joining it");
                self.waiters.push(reply);
            }
            ConnectionState::Reconnecting => {
                debug!("Connect requested while waiting to reconnect, retrying now");
                self.retry = None;
                self.provider = Some(provider);
                self.waiters.push(reply);
                self.start_attempt();
            }
            ConnectionState::Idle | ConnectionState::Closed | ConnectionState::Closing => {
                self.policy.reset();
                self.stats.set_exhausted(false);
                self.provider = Some(provider);
                self.waiters.push(reply);
                self.start_attempt();
            }
        }
    }

    fn start_attempt(&mut self) {
        let Some(provider) = self.provider.clone() else {
            warn!("No token provider available, cannot start a connect attempt");
            self.set_state(ConnectionState::Closed);
            self.fail_waiters(|| SyncError::token("no token provider"));
            return;
        };

        let connector = self.connector.clone();
        let config = self.config.clone();
        self.stats.record_attempt();
        self.set_state(ConnectionState::Connecting);

        self.attempt = Some(Box::pin(async move {
            let token = provider.fetch_token().await?;
            let url = build_connect_url(&config, &token)?;
            info!("Connecting to {}", redact(&url, &config.auth_param));

            let timeout = config.connect_timeout();
            match tokio::time::timeout(timeout, connector.connect(&url)).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::Timeout(timeout)),
            }
        }));
    }

    fn on_attempt_finished(&mut self, result: SyncResult<Link>) {
        self.attempt = None;

        match result {
            Ok(link) => {
                self.sink = Some(link.sink);
                self.events = Some(link.events);
                self.policy.reset();
                self.stats.set_exhausted(false);
                self.stats.record_open();
                self.heartbeat = Some(heartbeat(self.config.heartbeat_interval()));
                self.set_state(ConnectionState::Open);
                info!("Realtime connection open");

                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
            }
            Err(e) => {
                warn!("Connect attempt failed: {}", e);
                self.schedule_retry();
            }
        }
    }

    fn schedule_retry(&mut self) {
        match self.policy.next_delay() {
            Some(delay) => {
                info!(
                    "Reconnecting in {}ms (attempt {}/{})",
                    delay.as_millis(),
                    self.policy.attempt(),
                    self.policy.max_attempts()
                );
                self.retry = Some(Box::pin(tokio::time::sleep(delay)));
                self.set_state(ConnectionState::Reconnecting);
            }
            None => {
                let attempts = self.policy.attempt();
                error!("Max reconnection attempts ({}) exceeded", attempts);
                self.provider = None;
                self.stats.set_exhausted(true);
                self.set_state(ConnectionState::Closed);
                self.fail_waiters(|| SyncError::ReconnectExhausted { attempts });
            }
        }
    }

    fn on_retry_elapsed(&mut self) {
        self.retry = None;
        self.start_attempt();
    }

    async fn on_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Frame(text)) => self.on_frame(text).await,
            Some(TransportEvent::Error(message)) => warn!("Transport error: {}", message),
            Some(TransportEvent::Closed { code, reason }) => self.on_closed(code, &reason),
            None => self.on_closed(None, "stream ended"),
        }
    }

    async fn on_frame(&mut self, text: String) {
        self.stats.record_received();

        match keepalive(&text) {
            Some(Keepalive::Pong) => debug!("Heartbeat acknowledged"),
            Some(Keepalive::Ping) => {
                // Reply in the form the server used
                let pong = if text == KEEPALIVE_PING {
                    KEEPALIVE_PONG.to_string()
                } else {
                    format!(r#"{{"type":"{KEEPALIVE_PONG}"}}"#)
                };
                self.write(pong).await;
            }
            None => {
                for dispatcher in &self.dispatchers {
                    dispatcher.dispatch(&text);
                }
            }
        }
    }

    /// Only reached for closes the client did not start; `teardown` drops
    /// the event stream before it sends its own close frame.
    fn on_closed(&mut self, code: Option<u16>, reason: &str) {
        self.sink = None;
        self.events = None;
        self.heartbeat = None;

        self.stats.record_unexpected_close();
        warn!(
            "Connection closed by peer (code: {:?}, reason: {})",
            code, reason
        );
        self.schedule_retry();
    }

    async fn send_frame(&mut self, frame: String) -> SendOutcome {
        if self.state.is_open() && self.write(frame).await {
            return SendOutcome::Sent;
        }

        self.stats.record_dropped_send();
        warn!("Dropping outbound frame, connection is {}", self.state);
        SendOutcome::Dropped
    }

    async fn send_heartbeat(&mut self) {
        if !self.state.is_open() {
            self.heartbeat = None;
            return;
        }
        if self.write(KEEPALIVE_PING.to_string()).await {
            self.stats.record_heartbeat();
            debug!("Heartbeat sent");
        }
    }

    async fn write(&mut self, text: String) -> bool {
        let Some(sink) = self.sink.as_mut() else {
            return false;
        };

        match sink.send_text(text).await {
            Ok(()) => {
                self.stats.record_sent();
                true
            }
            Err(e) => {
                warn!("Failed to write frame: {}", e);
                false
            }
        }
    }

    /// Cancels timers and any in-flight attempt, closes the transport with
    /// the client close code, and ends in Closed. Idle stays Idle.
    async fn teardown(&mut self, reason: &str) {
        self.retry = None;
        self.heartbeat = None;
        self.attempt = None;
        self.provider = None;
        self.events = None;

        if let Some(mut sink) = self.sink.take() {
            self.set_state(ConnectionState::Closing);
            let close = sink.close(CLIENT_CLOSE_CODE, reason);
            match tokio::time::timeout(self.config.connect_timeout(), close).await {
                Ok(Ok(())) => debug!("Close frame sent ({})", reason),
                Ok(Err(e)) => debug!("Close frame not delivered: {}", e),
                Err(_) => debug!("Timed out sending close frame"),
            }
        }

        if self.state != ConnectionState::Idle {
            self.set_state(ConnectionState::Closed);
        }
        self.fail_waiters(|| SyncError::Disconnected);
    }

    fn fail_waiters(&mut self, make_error: impl Fn() -> SyncError) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(make_error()));
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("Connection state: {} -> {}", self.state, state);
        }
        self.state = state;
        self.state_tx.send_replace(state);
    }
}

/// First tick one full period after open
fn heartbeat(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn poll_attempt(attempt: &mut Option<PendingAttempt>) -> SyncResult<Link> {
    match attempt {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn next_event(events: &mut Option<EventStream>) -> Option<TransportEvent> {
    match events {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn retry_elapsed(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
