//! Connection configuration.
//!
//! `SyncConfig` describes where the realtime endpoint lives and how the
//! connection keeps itself alive. It can be built in code with the `with_*`
//! setters, deserialized by the host application, or read from
//! `REALTIME_SYNC_*` environment variables.

use serde::Deserialize;
use std::time::Duration;

use crate::error::SyncError;

/// Scheme of the page/app shell hosting the client. The socket mirrors it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageScheme {
    Http,
    Https,
}

impl PageScheme {
    /// WebSocket scheme matching the page scheme.
    pub fn websocket_scheme(self) -> &'static str {
        match self {
            PageScheme::Http => "ws",
            PageScheme::Https => "wss",
        }
    }
}

impl std::str::FromStr for PageScheme {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_end_matches(':').to_ascii_lowercase().as_str() {
            "http" | "ws" => Ok(PageScheme::Http),
            "https" | "wss" => Ok(PageScheme::Https),
            other => Err(SyncError::config(format!("unknown page scheme: {other}"))),
        }
    }
}

/// Reconnect backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on any single retry delay, in milliseconds
    pub max_delay_ms: u64,
    /// Retries scheduled before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

/// Configuration for the realtime connection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Host (and optional port) of the realtime endpoint
    pub host: String,
    /// Path of the realtime endpoint, e.g. `/ws`
    pub path: String,
    /// Query parameter that carries the identity token
    pub auth_param: String,
    /// Scheme of the hosting page; decides between `ws` and `wss`
    pub page_scheme: PageScheme,
    /// Keepalive interval in milliseconds
    pub heartbeat_interval_ms: u64,
    /// Bound on a single connect attempt in milliseconds
    pub connect_timeout_ms: u64,
    /// Capacity of the command channel into the connection task
    pub command_buffer: usize,
    pub reconnect: ReconnectSettings,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            path: "/ws".to_string(),
            auth_param: "token".to_string(),
            page_scheme: PageScheme::Https,
            heartbeat_interval_ms: 30_000,
            connect_timeout_ms: 10_000,
            command_buffer: 64,
            reconnect: ReconnectSettings::default(),
        }
    }
}

impl SyncConfig {
    /// Create a configuration for `host`, keeping every other default.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_auth_param(mut self, param: impl Into<String>) -> Self {
        self.auth_param = param.into();
        self
    }

    pub fn with_page_scheme(mut self, scheme: PageScheme) -> Self {
        self.page_scheme = scheme;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = duration_ms(interval);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_reconnect(
        mut self,
        base_delay: Duration,
        max_delay: Duration,
        max_attempts: u32,
    ) -> Self {
        self.reconnect = ReconnectSettings {
            base_delay_ms: duration_ms(base_delay),
            max_delay_ms: duration_ms(max_delay),
            max_attempts,
        };
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from `REALTIME_SYNC_*` keys resolved by `lookup`.
    ///
    /// Missing keys keep their defaults; malformed values are reported as
    /// [`SyncError::Config`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("REALTIME_SYNC_HOST") {
            config.host = host;
        }
        if let Some(path) = lookup("REALTIME_SYNC_PATH") {
            config.path = path;
        }
        if let Some(param) = lookup("REALTIME_SYNC_AUTH_PARAM") {
            config.auth_param = param;
        }
        if let Some(scheme) = lookup("REALTIME_SYNC_PAGE_SCHEME") {
            config.page_scheme = scheme.parse()?;
        }
        if let Some(value) = lookup("REALTIME_SYNC_HEARTBEAT_MS") {
            config.heartbeat_interval_ms = parse_number("REALTIME_SYNC_HEARTBEAT_MS", &value)?;
        }
        if let Some(value) = lookup("REALTIME_SYNC_CONNECT_TIMEOUT_MS") {
            config.connect_timeout_ms = parse_number("REALTIME_SYNC_CONNECT_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("REALTIME_SYNC_RECONNECT_BASE_MS") {
            config.reconnect.base_delay_ms = parse_number("REALTIME_SYNC_RECONNECT_BASE_MS", &value)?;
        }
        if let Some(value) = lookup("REALTIME_SYNC_RECONNECT_MAX_MS") {
            config.reconnect.max_delay_ms = parse_number("REALTIME_SYNC_RECONNECT_MAX_MS", &value)?;
        }
        if let Some(value) = lookup("REALTIME_SYNC_RECONNECT_ATTEMPTS") {
            config.reconnect.max_attempts = parse_number("REALTIME_SYNC_RECONNECT_ATTEMPTS", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the connection cannot work with.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.host.trim().is_empty() {
            return Err(SyncError::config("host must not be empty"));
        }
        if self.host.contains('/') {
            return Err(SyncError::config(format!(
                "host must be a bare host[:port] without scheme or path: {}",
                self.host
            )));
        }
        if self.auth_param.trim().is_empty() {
            return Err(SyncError::config("auth_param must not be empty"));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(SyncError::config("heartbeat interval must be > 0"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(SyncError::config("connect timeout must be > 0"));
        }
        if self.command_buffer == 0 {
            return Err(SyncError::config("command buffer must be > 0"));
        }
        if self.reconnect.base_delay_ms == 0 {
            return Err(SyncError::config("initial reconnect delay must be > 0"));
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(SyncError::config(
                "max reconnect delay must be >= initial reconnect delay",
            ));
        }
        Ok(())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SyncError> {
    value
        .trim()
        .parse()
        .map_err(|_| SyncError::config(format!("{key} is not a valid number: {value}")))
}
