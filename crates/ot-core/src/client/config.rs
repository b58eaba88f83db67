//! Configuration for the client state manager.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`OtStateManager`](super::OtStateManager).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateManagerConfig {
    /// Delay before re-polling after a failed poll, in milliseconds.
    pub poll_retry_delay_ms: u64,
    /// Start the background poll loop while change listeners exist.
    pub poll_enabled: bool,
}

impl Default for StateManagerConfig {
    fn default() -> Self {
        Self {
            poll_retry_delay_ms: 1000,
            poll_enabled: true,
        }
    }
}

impl StateManagerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_poll_retry_delay(mut self, delay: Duration) -> Self {
        self.poll_retry_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_poll_enabled(mut self, enabled: bool) -> Self {
        self.poll_enabled = enabled;
        self
    }

    #[inline]
    pub fn poll_retry_delay(&self) -> Duration {
        Duration::from_millis(self.poll_retry_delay_ms)
    }
}
