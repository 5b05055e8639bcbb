//! Per-job pipeline.
//!
//! A [`JobPipeline`] moves one [`Job`] through
//! `Validated → Fetching → Transforming → Packaging → Delivering → Completed`,
//! or into `Failed`/`Rejected` with a short reason. Every run yields exactly
//! one [`JobOutcome`] and releases its workspace afterwards.

mod config;
mod controller;
mod error;
mod types;

pub use config::{Messages, PipelineConfig, RetryConfig};
pub use controller::JobPipeline;
pub(crate) use controller::panic_message;
pub use error::JobError;
pub use types::{Job, JobId, JobOutcome, JobState};
