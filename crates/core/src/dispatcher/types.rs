//! Types for the dispatcher module.

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::pipeline::{JobId, JobOutcome};

/// Snapshot of the dispatcher's job pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherStatus {
    /// Whether new videos are still admitted.
    pub accepting: bool,
    /// Maximum concurrent jobs.
    pub max_concurrent: usize,
    /// Jobs holding a processing slot.
    pub active_jobs: usize,
    /// Jobs waiting for a slot.
    pub queued_jobs: usize,
    /// Jobs completed since startup.
    pub total_completed: u64,
    /// Jobs failed since startup.
    pub total_failed: u64,
    /// Jobs rejected since startup.
    pub total_rejected: u64,
}

/// What `dispatch` did with an inbound event.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The video was admitted; the handle resolves to its outcome.
    Accepted {
        job_id: JobId,
        handle: JoinHandle<JobOutcome>,
    },
    /// The video was refused and the requester notified.
    Rejected(JobOutcome),
    /// A command was answered; no job was created.
    Command,
}

impl DispatchOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}
