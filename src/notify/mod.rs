//! In-app alerts for realtime events.

mod bridge;
mod types;

pub use bridge::{NotificationBridge, NotificationStats};
pub use types::{Alert, AlertSink, ForegroundFlag, ForegroundProbe, Severity};
