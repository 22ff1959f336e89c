//! Reconnect backoff schedule.
//!
//! Maps a connection attempt count to the delay before the next attempt.
//! The table is ordered by ascending threshold and ends with a catch-all
//! tier, which encodes "never give up, cap the delay at the last tier".

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay used when a schedule is empty or no tier matches.
const FALLBACK_DELAY_MS: u64 = 1000;

/// One tier of a [`BackoffSchedule`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffTier {
    /// Highest attempt count this tier applies to. `None` marks the
    /// catch-all tier that matches any attempt count.
    pub up_to: Option<u32>,
    /// Delay before the next attempt, in milliseconds.
    pub delay_ms: u64,
}

impl BackoffTier {
    /// A tier matching attempt counts up to `up_to` inclusive.
    pub fn up_to(up_to: u32, delay_ms: u64) -> Self {
        Self {
            up_to: Some(up_to),
            delay_ms,
        }
    }

    /// The catch-all tier matching any attempt count.
    pub fn catch_all(delay_ms: u64) -> Self {
        Self {
            up_to: None,
            delay_ms,
        }
    }
}

/// Ordered attempt-count → delay table.
///
/// Lookup returns the delay of the first tier whose threshold is at least
/// the current attempt count. A well-formed schedule ends with a catch-all
/// tier; a schedule without one falls back to 1000 ms past its last tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffSchedule {
    tiers: Vec<BackoffTier>,
}

impl BackoffSchedule {
    /// Build a schedule from tiers ordered by ascending threshold.
    pub fn new(tiers: Vec<BackoffTier>) -> Self {
        Self { tiers }
    }

    /// Delay before the next attempt, given the attempts made so far.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        for tier in &self.tiers {
            match tier.up_to {
                Some(threshold) if attempts <= threshold => {
                    return Duration::from_millis(tier.delay_ms);
                }
                None => return Duration::from_millis(tier.delay_ms),
                Some(_) => {}
            }
        }
        Duration::from_millis(FALLBACK_DELAY_MS)
    }

    /// Number of tiers in the schedule.
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// Whether the schedule has no tiers.
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

impl Default for BackoffSchedule {
    /// The stock reconnect ladder: immediate first retry, then 100 ms,
    /// 1 s, 10 s, capping at 60 s forever.
    fn default() -> Self {
        Self::new(vec![
            BackoffTier::up_to(0, 1),
            BackoffTier::up_to(1, 100),
            BackoffTier::up_to(2, 1000),
            BackoffTier::up_to(10, 10_000),
            BackoffTier::catch_all(60_000),
        ])
    }
}
