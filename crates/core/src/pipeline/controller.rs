//! Drives one job from fetch to delivery.

use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::converter::{MediaTransformer, NotePackager, TransformParams};
use crate::metrics;
use crate::transport::{ReplyTarget, Transport, TransportError};
use crate::workspace::{Workspace, WorkspaceManager};

use super::config::{Messages, PipelineConfig};
use super::error::JobError;
use super::types::{Job, JobId, JobOutcome, JobState};

/// The per-job state machine.
///
/// Cheap to clone; every clone shares the same transport, tools and
/// workspace manager.
#[derive(Clone)]
pub struct JobPipeline {
    transport: Arc<dyn Transport>,
    transformer: Arc<dyn MediaTransformer>,
    packager: Arc<dyn NotePackager>,
    workspaces: Arc<WorkspaceManager>,
    params: TransformParams,
    messages: Messages,
    config: PipelineConfig,
}

impl JobPipeline {
    /// Creates a pipeline with default messages and no retries.
    pub fn new(
        transport: Arc<dyn Transport>,
        transformer: Arc<dyn MediaTransformer>,
        packager: Arc<dyn NotePackager>,
        workspaces: Arc<WorkspaceManager>,
        params: TransformParams,
    ) -> Self {
        Self {
            transport,
            transformer,
            packager,
            workspaces,
            params,
            messages: Messages::default(),
            config: PipelineConfig::default(),
        }
    }

    /// Sets the user-facing texts.
    pub fn with_messages(mut self, messages: Messages) -> Self {
        self.messages = messages;
        self
    }

    /// Sets the pipeline configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn params(&self) -> &TransformParams {
        &self.params
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Checks the declared size and moves the job to `Validated`.
    pub fn validate(&self, job: &mut Job) -> Result<(), JobError> {
        if job.source_size_bytes > self.params.max_input_bytes {
            return Err(JobError::Validation {
                declared_bytes: job.source_size_bytes,
                max_bytes: self.params.max_input_bytes,
            });
        }
        job.advance(JobState::Validated)
    }

    /// Replies to a start or help command.
    pub async fn welcome(&self, target: &ReplyTarget) {
        let text = self.messages.welcome(self.params.max_input_mib());
        if let Err(e) = self.transport.send_message(target, &text).await {
            warn!(chat = %target.chat, "Failed to send welcome message: {}", e);
        }
    }

    /// Ends a job that was never admitted and notifies the requester.
    pub async fn reject(&self, mut job: Job, error: JobError) -> JobOutcome {
        let reason = error.reason();
        if let Err(e) = job.advance(JobState::Rejected(reason.to_string())) {
            error!(job_id = %job.id, "Cannot reject job: {}", e);
        }

        if error.is_rejection() {
            info!(
                job_id = %job.id,
                declared_bytes = job.source_size_bytes,
                reason,
                "Job rejected: {}",
                error
            );
        } else {
            warn!(job_id = %job.id, reason, "Job refused: {}", error);
        }

        let text = match &error {
            JobError::Validation { .. } => self.messages.too_large(self.params.max_input_mib()),
            JobError::Busy => self.messages.busy.clone(),
            other => self.messages.failure(other.user_summary()),
        };
        if let Err(e) = self.transport.send_message(&job.reply_target, &text).await {
            warn!(job_id = %job.id, "Failed to send rejection notice: {}", e);
        }

        self.finish(job, Instant::now())
    }

    /// Posts the "waiting" status for a job that has to wait for a slot.
    pub async fn announce_queued(&self, job: &mut Job) {
        self.post_status(job, &self.messages.queued).await;
    }

    /// Runs an admitted job to its terminal state.
    ///
    /// Always returns exactly one outcome. The workspace, if one was
    /// acquired, is released after the outcome is decided.
    pub async fn run(&self, mut job: Job) -> JobOutcome {
        let started = Instant::now();

        if job.state() == &JobState::Received {
            if let Err(e) = self.validate(&mut job) {
                return self.reject(job, e).await;
            }
        }

        let waited = Utc::now() - job.received_at;
        info!(
            job_id = %job.id,
            waited_ms = waited.num_milliseconds(),
            "Job started"
        );
        self.post_status(&mut job, &self.messages.starting).await;

        let workspace = match self.workspaces.acquire(&job.id) {
            Ok(ws) => ws,
            Err(e) => return self.fail(job, JobError::Workspace(e), started).await,
        };

        // A panicking stage fails only this job, through the normal failure path.
        let executed = AssertUnwindSafe(self.execute(&mut job, &workspace))
            .catch_unwind()
            .await;
        let outcome = match executed {
            Ok(Ok(())) => self.complete(job, started).await,
            Ok(Err(e)) => self.fail(job, e, started).await,
            Err(payload) => {
                let error = JobError::Internal(panic_message(&*payload));
                self.fail(job, error, started).await
            }
        };

        let report = self.workspaces.release(workspace);
        if !report.is_clean() {
            warn!(job_id = %outcome.job_id, failed = report.failed, "Workspace cleanup incomplete");
        }

        outcome
    }

    async fn execute(&self, job: &mut Job, workspace: &Workspace) -> Result<(), JobError> {
        let job_id = job.id.clone();
        let target = job.reply_target;

        // Fetch
        job.advance(JobState::Fetching)?;
        let stage = Instant::now();
        let media = job.media.clone();
        let bytes = self
            .with_retry(&job_id, "fetch", || self.transport.fetch_media(&media))
            .await
            .map_err(JobError::Fetch)?;
        tokio::fs::write(workspace.input_path(), &bytes).await?;
        observe_stage("fetch", stage);
        info!(job_id = %job_id, bytes = bytes.len(), "Upload fetched");
        drop(bytes);

        if let Some(handle) = job.status_message {
            if let Err(e) = self
                .transport
                .edit_message(&target, handle, &self.messages.processing)
                .await
            {
                warn!(job_id = %job_id, "Failed to update status message: {}", e);
            }
        }

        // Transform
        job.advance(JobState::Transforming)?;
        let stage = Instant::now();
        let normalized = self
            .transformer
            .normalize(
                workspace.input_path(),
                workspace.normalized_path(),
                &self.params,
            )
            .await
            .map_err(|e| {
                record_tool_failure("transform", &e);
                JobError::Transform(e)
            })?;
        observe_stage("transform", stage);
        debug!(
            job_id = %job_id,
            side = normalized.side,
            duration_secs = normalized.duration_secs,
            trimmed = normalized.trimmed,
            "Clip normalized"
        );

        // Package
        job.advance(JobState::Packaging)?;
        let stage = Instant::now();
        let packed = self
            .packager
            .pack(
                workspace.normalized_path(),
                workspace.packaged_path(),
                &self.params,
            )
            .await
            .map_err(|e| {
                record_tool_failure("package", &e);
                JobError::Package(e)
            })?;
        observe_stage("package", stage);
        debug!(
            job_id = %job_id,
            side = packed.side,
            bytes = packed.output_size_bytes,
            "Note packaged"
        );

        // Deliver
        job.advance(JobState::Delivering)?;
        let stage = Instant::now();
        let note = tokio::fs::read(workspace.packaged_path()).await?;
        self.with_retry(&job_id, "deliver", || {
            self.transport
                .send_video_note(&target, note.clone(), packed.side)
        })
        .await
        .map_err(JobError::Delivery)?;
        observe_stage("deliver", stage);

        Ok(())
    }

    async fn complete(&self, mut job: Job, started: Instant) -> JobOutcome {
        if let Err(e) = job.advance(JobState::Completed) {
            return self.fail(job, e, started).await;
        }

        self.clear_status(&mut job).await;
        if let Err(e) = self
            .transport
            .send_message(&job.reply_target, &self.messages.follow_up)
            .await
        {
            warn!(job_id = %job.id, "Failed to send follow-up: {}", e);
        }

        let outcome = self.finish(job, started);
        info!(job_id = %outcome.job_id, duration_ms = outcome.duration_ms, "Job completed");
        outcome
    }

    async fn fail(&self, mut job: Job, error: JobError, started: Instant) -> JobOutcome {
        let reason = error.reason();
        if !job.state().is_terminal() {
            // Failed is reachable from every non-terminal state.
            let _ = job.advance(JobState::Failed(reason.to_string()));
        }

        match error.diagnostics() {
            Some(tail) => error!(
                job_id = %job.id,
                reason,
                stderr_tail = tail,
                "Job failed: {}",
                error
            ),
            None => error!(job_id = %job.id, reason, "Job failed: {}", error),
        }

        self.clear_status(&mut job).await;
        let text = self.messages.failure(error.user_summary());
        if let Err(e) = self.transport.send_message(&job.reply_target, &text).await {
            warn!(job_id = %job.id, "Failed to send failure notice: {}", e);
        }

        self.finish(job, started)
    }

    /// Ends a job whose pipeline task panicked outside the stage body.
    ///
    /// The job and its status message are gone with the unwound task; only
    /// the requester can still be told.
    pub async fn abandon(
        &self,
        job_id: JobId,
        target: &ReplyTarget,
        error: JobError,
        started: Instant,
    ) -> JobOutcome {
        error!(job_id = %job_id, "Job abandoned: {}", error);
        let text = self.messages.failure(error.user_summary());
        if let Err(e) = self.transport.send_message(target, &text).await {
            warn!(job_id = %job_id, "Failed to send failure notice: {}", e);
        }
        record_outcome(job_id, JobState::Failed(error.reason().to_string()), started)
    }

    fn finish(&self, job: Job, started: Instant) -> JobOutcome {
        let state = job.state().clone();
        record_outcome(job.id, state, started)
    }

    /// Posts `text` as the status message, or edits the existing one.
    async fn post_status(&self, job: &mut Job, text: &str) {
        match job.status_message {
            Some(handle) => {
                if let Err(e) = self
                    .transport
                    .edit_message(&job.reply_target, handle, text)
                    .await
                {
                    warn!(job_id = %job.id, "Failed to update status message: {}", e);
                }
            }
            None => match self.transport.send_message(&job.reply_target, text).await {
                Ok(handle) => job.status_message = Some(handle),
                Err(e) => warn!(job_id = %job.id, "Failed to post status message: {}", e),
            },
        }
    }

    async fn clear_status(&self, job: &mut Job) {
        if let Some(handle) = job.status_message.take() {
            if let Err(e) = self
                .transport
                .delete_message(&job.reply_target, handle)
                .await
            {
                debug!(job_id = %job.id, "Failed to delete status message: {}", e);
            }
        }
    }

    async fn with_retry<T, F, Fut>(
        &self,
        job_id: &JobId,
        op: &'static str,
        mut call: F,
    ) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts => {
                    warn!(
                        job_id = %job_id,
                        op,
                        attempt,
                        max_attempts,
                        "Transport call failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(self.config.retry.delay()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn record_outcome(job_id: JobId, state: JobState, started: Instant) -> JobOutcome {
    let elapsed = started.elapsed();

    metrics::JOBS_TOTAL.with_label_values(&[state.as_str()]).inc();
    metrics::JOB_DURATION
        .with_label_values(&[state.as_str()])
        .observe(elapsed.as_secs_f64());

    JobOutcome {
        job_id,
        state,
        duration_ms: elapsed.as_millis() as u64,
        finished_at: Utc::now(),
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn observe_stage(stage: &str, started: Instant) {
    metrics::STAGE_DURATION
        .with_label_values(&[stage])
        .observe(started.elapsed().as_secs_f64());
}

fn record_tool_failure(stage: &str, error: &crate::converter::ConverterError) {
    if error.is_encoding_tool_failure() {
        metrics::ENCODING_TOOL_FAILURES
            .with_label_values(&[stage, error.kind()])
            .inc();
    }
}
