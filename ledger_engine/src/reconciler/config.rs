use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::watch::WatchConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Time between sweeps. This is the upper bound on how long a lost watch goes unnoticed.
    pub interval: Duration,
    pub batch_size: u32,
    /// Flows younger than this are skipped, since their watch was registered moments ago.
    pub min_age: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(24 * 60 * 60), batch_size: 100, min_age: Duration::from_secs(60) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    pub watch: WatchConfig,
    pub sweep: SweepConfig,
    /// How long tasks get to finish on their own once shutdown starts.
    pub shutdown_timeout: Duration,
    /// How long to wait for aborted tasks after the graceful timeout expired.
    pub forced_shutdown_timeout: Duration,
    /// Channel capacity for each event hook.
    pub event_buffer_size: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            watch: WatchConfig::default(),
            sweep: SweepConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
            forced_shutdown_timeout: Duration::from_secs(5),
            event_buffer_size: 32,
        }
    }
}
