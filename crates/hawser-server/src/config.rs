//! Session registry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::registry::SessionRegistry`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Liveness sweep interval in milliseconds (default: 30000).
    ///
    /// Each sweep probes every session that answered since the previous
    /// sweep and evicts every session that did not, so an unresponsive
    /// peer survives at most two intervals.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// Whether to log session lifecycle at info level (default: true).
    #[serde(default = "default_true")]
    pub log_connections: bool,
}

fn default_ping_interval_ms() -> u64 {
    30_000
}
fn default_true() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: default_ping_interval_ms(),
            log_connections: true,
        }
    }
}

impl RegistryConfig {
    /// Sweep interval as a [`Duration`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }
}
