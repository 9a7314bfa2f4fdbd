//! Composition root for the realtime sync layer.
//!
//! One [`RealtimeSync`] per app session. It owns the connection, the
//! account-sync dispatcher and both bridges; the UI and cache layers plug in
//! through [`ForegroundProbe`], [`AlertSink`] and [`CacheInvalidator`].

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::info;

use crate::{
    cache::{CacheInvalidationAdapter, CacheInvalidator, InvalidationStats},
    config::SyncConfig,
    connection::{ConnectionManager, ConnectionState, SendOutcome, TokenProvider},
    error::{SyncError, SyncResult},
    events::{EventDispatcher, MessageEnvelope, Subscription, WILDCARD},
    notify::{AlertSink, ForegroundProbe, NotificationBridge, NotificationStats},
    transport::Connector,
};

/// Dispatcher domain for account events
pub const ACCOUNT_DOMAIN: &str = "account";

pub struct RealtimeSync {
    manager: ConnectionManager,
    dispatcher: Arc<EventDispatcher>,
    notifications: Arc<NotificationBridge>,
    cache: Arc<CacheInvalidationAdapter>,
    bridges: Mutex<Vec<Subscription>>,
}

impl RealtimeSync {
    /// Wire the default bridges to the account dispatcher and spawn the connection.
    ///
    /// Must be called inside a Tokio runtime. Does not connect.
    pub fn init(
        config: SyncConfig,
        connector: Arc<dyn Connector>,
        foreground: Arc<dyn ForegroundProbe>,
        alerts: Arc<dyn AlertSink>,
        cache: Arc<dyn CacheInvalidator>,
    ) -> SyncResult<Self> {
        Self::with_bridges(
            config,
            connector,
            NotificationBridge::new(foreground, alerts),
            CacheInvalidationAdapter::new(cache),
        )
    }

    /// Like [`RealtimeSync::init`], with bridges whose tables were customized.
    pub fn with_bridges(
        config: SyncConfig,
        connector: Arc<dyn Connector>,
        notifications: NotificationBridge,
        cache: CacheInvalidationAdapter,
    ) -> SyncResult<Self> {
        let dispatcher = Arc::new(EventDispatcher::new(ACCOUNT_DOMAIN));
        let notifications = Arc::new(notifications);
        let cache = Arc::new(cache);

        // Cache first so refetches start before the alert is shown
        let bridges = vec![
            dispatcher.subscribe_handler(WILDCARD, cache.clone()),
            dispatcher.subscribe_handler(WILDCARD, notifications.clone()),
        ];

        let manager = ConnectionManager::builder(config)
            .with_connector(connector)
            .with_dispatcher(dispatcher.clone())
            .build()?;

        info!("Realtime sync initialized");
        Ok(Self {
            manager,
            dispatcher,
            notifications,
            cache,
            bridges: Mutex::new(bridges),
        })
    }

    pub async fn connect(&self, provider: Arc<dyn TokenProvider>) -> SyncResult<()> {
        self.manager.connect(provider).await
    }

    pub async fn disconnect(&self, reason: &str) {
        self.manager.disconnect(reason).await
    }

    pub async fn send(&self, data: impl Into<String>) -> SendOutcome {
        self.manager.send(data).await
    }

    /// Subscribe to account events; see [`EventDispatcher::subscribe`].
    pub fn subscribe<F>(&self, event_key: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&MessageEnvelope) -> Result<(), SyncError> + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(event_key, handler)
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.manager.watch_state()
    }

    /// Flips to `true` when the connection gave up reconnecting.
    pub fn watch_exhausted(&self) -> watch::Receiver<bool> {
        self.manager.watch_exhausted()
    }

    /// Invalidate a cache signal without waiting for a server event.
    pub fn force_refresh(&self, signal: &str) {
        self.cache.force_refresh(signal);
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn notification_stats(&self) -> NotificationStats {
        self.notifications.stats()
    }

    pub fn invalidation_stats(&self) -> InvalidationStats {
        self.cache.stats()
    }

    /// Close the connection, stop its task, and detach both bridges.
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
        self.bridges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("Realtime sync shut down");
    }
}
