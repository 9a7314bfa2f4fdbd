//! Error types for the realtime sync layer.

use std::time::Duration;

/// Error types for connection lifecycle, decoding, and event delivery
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("WebSocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parse error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid connection URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Frame error: {0}")]
    Frame(String),

    #[error("Identity token error: {0}")]
    Token(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connect attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Subscriber error: {0}")]
    Handler(String),

    #[error("Connection closed by client")]
    Disconnected,

    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Connection task is no longer running")]
    ActorGone,
}

impl SyncError {
    /// Create a subscriber error from any displayable cause.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// Create an identity token error.
    pub fn token(message: impl Into<String>) -> Self {
        Self::Token(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error ends the connection for good until an explicit `connect()`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncError::Disconnected | SyncError::ReconnectExhausted { .. } | SyncError::ActorGone
        )
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
