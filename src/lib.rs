//! Realtime sync layer for the wallet app.
//!
//! Keeps one authenticated WebSocket open while the user is signed in,
//! decodes pushed account events, and fans them out to in-app alerts and
//! cache invalidation.
//!
//! ```text
//! transport frame -> ConnectionManager -> EventDispatcher -> NotificationBridge
//!                                                         -> CacheInvalidationAdapter
//! ```

pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod logging;
pub mod notify;
pub mod session;
pub mod transport;

pub use cache::{CacheInvalidationAdapter, CacheInvalidator, InvalidationStats};
pub use config::{PageScheme, ReconnectSettings, SyncConfig};
pub use connection::{
    ConnectionManager, ConnectionState, ConnectionStats, SendOutcome, StaticToken, TokenProvider,
    token_fn,
};
pub use error::{SyncError, SyncResult};
pub use events::{EventDispatcher, EventHandler, EventKind, MessageEnvelope, Subscription, WILDCARD};
pub use notify::{Alert, AlertSink, ForegroundFlag, ForegroundProbe, NotificationBridge, Severity};
pub use session::RealtimeSync;
pub use transport::{Connector, WebSocketConnector};
