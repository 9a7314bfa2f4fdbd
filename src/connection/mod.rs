//! Lifecycle of the single realtime connection.
//!
//! [`ConnectionManager`] is the handle; a spawned task owns the transport,
//! the heartbeat and the reconnect timer.

mod actor;
/// Handle and builder
pub mod manager;
/// Reconnect backoff
pub mod reconnect;
/// State, send outcomes, and counters
pub mod state;
/// Identity token providers
pub mod token;

pub use manager::{ConnectionManager, ConnectionManagerBuilder};
pub use reconnect::ReconnectPolicy;
pub use state::{ConnectionState, ConnectionStats, SendOutcome};
pub use token::{StaticToken, TokenFn, TokenProvider, token_fn};
