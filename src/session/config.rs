use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::state::Party;

pub const DEFAULT_COUNTDOWN_SECS: u32 = 30;

/// Configuration for recording sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds a recording may run before it stops on its own
    /// Default: 30
    pub countdown_secs: u32,

    /// Period of one countdown step in milliseconds
    /// Default: 1000
    pub tick_interval_ms: u64,

    /// Party new recordings are routed to until the UI switches
    pub default_mode: Party,
}

impl SessionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
            tick_interval_ms: 1000,
            default_mode: Party::Person1,
        }
    }
}
