//! Connection manager configuration.

use std::time::Duration;

use hawser_core::backoff::BackoffSchedule;
use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::manager::ConnectionManager`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// WebSocket URL to connect to (e.g. `ws://127.0.0.1:9000/ws`).
    pub url: String,
    /// Handshake timeout in milliseconds (default: 15000).
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Backoff schedule between connection attempts.
    #[serde(default)]
    pub backoff: BackoffSchedule,
    /// Interval for proactive rotation of the active connection, in
    /// milliseconds. `0` disables seamless reconnect (default).
    #[serde(default)]
    pub seamless_reconnect_interval_ms: u64,
    /// Whether to start a new attempt when the active connection closes
    /// (default: true).
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    /// Heartbeat ping interval in milliseconds (default: 30000).
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// Deadline for the heartbeat reply in milliseconds (default: 30000).
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    /// Whether to log connection lifecycle at info level (default: true).
    #[serde(default = "default_true")]
    pub log_actions: bool,
}

fn default_handshake_timeout_ms() -> u64 {
    15_000
}
fn default_ping_interval_ms() -> u64 {
    30_000
}
fn default_ping_timeout_ms() -> u64 {
    30_000
}
fn default_true() -> bool {
    true
}

impl ManagerConfig {
    /// A configuration with defaults for everything but the URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            backoff: BackoffSchedule::default(),
            seamless_reconnect_interval_ms: 0,
            auto_reconnect: true,
            ping_interval_ms: default_ping_interval_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
            log_actions: true,
        }
    }

    /// Handshake timeout as a [`Duration`].
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Heartbeat ping interval as a [`Duration`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Heartbeat reply deadline as a [`Duration`].
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    /// Seamless reconnect interval, `None` when disabled.
    pub fn seamless_reconnect_interval(&self) -> Option<Duration> {
        if self.seamless_reconnect_interval_ms > 0 {
            Some(Duration::from_millis(self.seamless_reconnect_interval_ms))
        } else {
            None
        }
    }
}
