//! Types for the job pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

use crate::transport::{MediaRef, MessageHandle, ReplyTarget};

use super::error::JobError;

/// Opaque job token, safe to use as a directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Wraps an existing token.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Derives a fresh id from a media reference.
    ///
    /// The hash prefix ties the id to its upload; the random suffix keeps two
    /// jobs for the same upload apart.
    pub fn from_media_ref(media: &str) -> Self {
        let digest = Sha256::digest(media.as_bytes());
        let hash = format!("{:x}", digest);
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", &hash[..16], &nonce[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum JobState {
    Received,
    Validated,
    Fetching,
    Transforming,
    Packaging,
    Delivering,
    Completed,
    Failed(String),
    Rejected(String),
}

impl JobState {
    /// Returns the string name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Received => "received",
            JobState::Validated => "validated",
            JobState::Fetching => "fetching",
            JobState::Transforming => "transforming",
            JobState::Packaging => "packaging",
            JobState::Delivering => "delivering",
            JobState::Completed => "completed",
            JobState::Failed(_) => "failed",
            JobState::Rejected(_) => "rejected",
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed(_) | JobState::Rejected(_)
        )
    }

    /// Whether moving from `self` to `next` is a legal step.
    pub fn can_transition_to(&self, next: &JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobState::Failed(_) | JobState::Rejected(_) => true,
            JobState::Validated => *self == JobState::Received,
            JobState::Fetching => *self == JobState::Validated,
            JobState::Transforming => *self == JobState::Fetching,
            JobState::Packaging => *self == JobState::Transforming,
            JobState::Delivering => *self == JobState::Packaging,
            JobState::Completed => *self == JobState::Delivering,
            JobState::Received => false,
        }
    }

    /// Failure or rejection reason, for terminal error states.
    pub fn reason(&self) -> Option<&str> {
        match self {
            JobState::Failed(reason) | JobState::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{}({})", self.as_str(), reason),
            None => f.write_str(self.as_str()),
        }
    }
}

/// One transcode request. Owned and mutated by a single pipeline run.
#[derive(Debug)]
pub struct Job {
    /// Unique token namespacing this job's temp files.
    pub id: JobId,
    /// The upload to fetch.
    pub media: MediaRef,
    /// Size declared by the transport, checked before fetching.
    pub source_size_bytes: u64,
    /// Where status and results go.
    pub reply_target: ReplyTarget,
    /// When the request arrived.
    pub received_at: DateTime<Utc>,
    /// Progress message edited as the job advances.
    pub status_message: Option<MessageHandle>,
    state: JobState,
}

impl Job {
    /// Creates a job in the `Received` state.
    pub fn new(media: MediaRef, source_size_bytes: u64, reply_target: ReplyTarget) -> Self {
        Self {
            id: JobId::from_media_ref(media.as_str()),
            media,
            source_size_bytes,
            reply_target,
            received_at: Utc::now(),
            status_message: None,
            state: JobState::Received,
        }
    }

    /// Current state.
    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// Moves to `next`, refusing illegal transitions.
    pub fn advance(&mut self, next: JobState) -> Result<(), JobError> {
        if !self.state.can_transition_to(&next) {
            return Err(JobError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(job_id = %self.id, from = %self.state, to = %next, "Job state change");
        self.state = next;
        Ok(())
    }
}

/// The single terminal result of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Job this outcome belongs to.
    pub job_id: JobId,
    /// Terminal state reached.
    pub state: JobState,
    /// Total time from start of processing to the terminal state.
    pub duration_ms: u64,
    /// When the terminal state was reached.
    pub finished_at: DateTime<Utc>,
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        self.state == JobState::Completed
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, JobState::Failed(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.state, JobState::Rejected(_))
    }

    /// Failure or rejection reason, if any.
    pub fn reason(&self) -> Option<&str> {
        self.state.reason()
    }
}
