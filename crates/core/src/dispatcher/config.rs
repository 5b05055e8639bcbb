//! Configuration for the dispatcher module.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do with a video when every processing slot is taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Wait for a slot, up to `max_queued_jobs` waiting jobs.
    #[default]
    Queue,
    /// Refuse immediately with a busy notice.
    Reject,
}

/// Admission control settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Maximum jobs processed at once.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Behaviour when all slots are taken.
    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Maximum jobs waiting for a slot under [`OverflowPolicy::Queue`].
    #[serde(default = "default_max_queued_jobs")]
    pub max_queued_jobs: usize,

    /// How long shutdown waits for in-flight jobs.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_max_queued_jobs() -> usize {
    32
}

fn default_drain_timeout() -> u64 {
    120
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            overflow: OverflowPolicy::default(),
            max_queued_jobs: default_max_queued_jobs(),
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

impl DispatcherConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
