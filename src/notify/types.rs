use serde::Serialize;
use std::{
    str::FromStr,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::error::SyncError;

/// How an alert is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(Severity::Success),
            "error" => Ok(Severity::Error),
            "warning" | "warn" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            other => Err(SyncError::Frame(format!("unknown severity: {other}"))),
        }
    }
}

/// User-visible alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub event_type: String,
}

/// Renders alerts in the UI
pub trait AlertSink: Send + Sync {
    fn render(&self, alert: &Alert);
}

/// Reports whether the consuming surface is visible
pub trait ForegroundProbe: Send + Sync {
    fn is_foreground(&self) -> bool;
}

impl<F> ForegroundProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_foreground(&self) -> bool {
        self()
    }
}

/// Foreground flag the UI flips on visibility changes
#[derive(Debug)]
pub struct ForegroundFlag(AtomicBool);

impl ForegroundFlag {
    pub fn new(foreground: bool) -> Self {
        Self(AtomicBool::new(foreground))
    }

    pub fn set(&self, foreground: bool) {
        self.0.store(foreground, Ordering::Relaxed);
    }
}

impl Default for ForegroundFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ForegroundProbe for ForegroundFlag {
    fn is_foreground(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
