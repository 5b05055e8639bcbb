//! Dispatcher implementation.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::pipeline::{panic_message, Job, JobError, JobOutcome, JobPipeline, JobState};
use crate::transport::InboundEvent;

use super::config::{DispatcherConfig, OverflowPolicy};
use super::types::{DispatchOutcome, DispatcherStatus};

/// Tracks statistics for the job pool.
#[derive(Default)]
struct PoolStats {
    active: AtomicUsize,
    queued: AtomicUsize,
    /// Admitted jobs that have not produced an outcome yet.
    pending: AtomicUsize,
    total_completed: AtomicU64,
    total_failed: AtomicU64,
    total_rejected: AtomicU64,
    idle: Notify,
}

impl PoolStats {
    fn record(&self, outcome: &JobOutcome) {
        let counter = match outcome.state {
            JobState::Completed => &self.total_completed,
            JobState::Rejected(_) => &self.total_rejected,
            _ => &self.total_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn try_enqueue(&self, limit: usize) -> bool {
        self.queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |queued| {
                (queued < limit).then_some(queued + 1)
            })
            .is_ok()
    }

    fn finish(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        self.idle.notify_waiters();
    }
}

/// Accepts inbound events and runs admitted jobs concurrently.
///
/// At most `max_concurrent_jobs` jobs hold a slot at once. Overflow either
/// waits in a bounded queue or is rejected as busy, per [`OverflowPolicy`].
pub struct Dispatcher {
    pipeline: JobPipeline,
    config: DispatcherConfig,
    slots: Arc<Semaphore>,
    stats: Arc<PoolStats>,
    accepting: AtomicBool,
}

impl Dispatcher {
    /// Creates a new dispatcher.
    pub fn new(pipeline: JobPipeline, config: DispatcherConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            pipeline,
            config,
            slots,
            stats: Arc::new(PoolStats::default()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Returns the current pool status.
    pub fn status(&self) -> DispatcherStatus {
        DispatcherStatus {
            accepting: self.accepting.load(Ordering::Relaxed),
            max_concurrent: self.config.max_concurrent_jobs.max(1),
            active_jobs: self.stats.active.load(Ordering::Relaxed),
            queued_jobs: self.stats.queued.load(Ordering::Relaxed),
            total_completed: self.stats.total_completed.load(Ordering::Relaxed),
            total_failed: self.stats.total_failed.load(Ordering::Relaxed),
            total_rejected: self.stats.total_rejected.load(Ordering::Relaxed),
        }
    }

    /// Consumes events until the channel closes.
    pub async fn run(&self, mut events: mpsc::Receiver<InboundEvent>) {
        info!(
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            overflow = ?self.config.overflow,
            "Dispatcher started"
        );
        while let Some(event) = events.recv().await {
            self.dispatch(event).await;
        }
        debug!("Event channel closed");
    }

    /// Handles one inbound event.
    ///
    /// Returns promptly: admitted jobs run in the background. Rejections are
    /// answered before this returns.
    pub async fn dispatch(&self, event: InboundEvent) -> DispatchOutcome {
        debug!(chat = %event.reply_target().chat, "Inbound event");
        match event {
            InboundEvent::Start { reply_target } => {
                let pipeline = self.pipeline.clone();
                tokio::spawn(async move { pipeline.welcome(&reply_target).await });
                DispatchOutcome::Command
            }
            InboundEvent::Video {
                media,
                declared_size_bytes,
                reply_target,
            } => {
                let job = Job::new(media, declared_size_bytes, reply_target);
                self.admit(job).await
            }
        }
    }

    async fn admit(&self, mut job: Job) -> DispatchOutcome {
        if !self.accepting.load(Ordering::SeqCst) {
            return self.refuse(job, JobError::Busy).await;
        }

        if let Err(e) = self.pipeline.validate(&mut job) {
            return self.refuse(job, e).await;
        }

        let permit = match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(TryAcquireError::NoPermits) => match self.config.overflow {
                OverflowPolicy::Queue if self.stats.try_enqueue(self.config.max_queued_jobs) => {
                    metrics::JOBS_QUEUED.inc();
                    None
                }
                _ => return self.refuse(job, JobError::Busy).await,
            },
            Err(TryAcquireError::Closed) => return self.refuse(job, JobError::Busy).await,
        };

        let job_id = job.id.clone();
        debug!(job_id = %job_id, queued = permit.is_none(), "Job admitted");

        self.stats.pending.fetch_add(1, Ordering::SeqCst);
        let handle = tokio::spawn(run_job(
            self.pipeline.clone(),
            Arc::clone(&self.slots),
            Arc::clone(&self.stats),
            job,
            permit,
        ));

        DispatchOutcome::Accepted { job_id, handle }
    }

    async fn refuse(&self, job: Job, error: JobError) -> DispatchOutcome {
        let outcome = self.pipeline.reject(job, error).await;
        self.stats.record(&outcome);
        DispatchOutcome::Rejected(outcome)
    }

    /// Stops admitting videos and waits for admitted jobs to finish.
    ///
    /// Returns `true` if every job finished within `timeout`.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.accepting.store(false, Ordering::SeqCst);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let idle = self.stats.idle.notified();
            let pending = self.stats.pending.load(Ordering::SeqCst);
            if pending == 0 {
                info!("Dispatcher drained");
                return true;
            }
            debug!(pending, "Waiting for jobs to finish");
            if tokio::time::timeout_at(deadline, idle).await.is_err() {
                warn!(
                    pending = self.stats.pending.load(Ordering::SeqCst),
                    "Drain timed out with jobs still running"
                );
                return false;
            }
        }
    }
}

async fn run_job(
    pipeline: JobPipeline,
    slots: Arc<Semaphore>,
    stats: Arc<PoolStats>,
    mut job: Job,
    permit: Option<OwnedSemaphorePermit>,
) -> JobOutcome {
    let permit = match permit {
        Some(permit) => permit,
        None => {
            pipeline.announce_queued(&mut job).await;
            let acquired = slots.acquire_owned().await;
            stats.queued.fetch_sub(1, Ordering::SeqCst);
            metrics::JOBS_QUEUED.dec();
            match acquired {
                Ok(permit) => permit,
                Err(_) => {
                    let outcome = pipeline.reject(job, JobError::Busy).await;
                    stats.record(&outcome);
                    stats.finish();
                    return outcome;
                }
            }
        }
    };

    stats.active.fetch_add(1, Ordering::SeqCst);
    metrics::JOBS_IN_FLIGHT.inc();

    let job_id = job.id.clone();
    let reply_target = job.reply_target;
    let started = Instant::now();
    // Stage panics are handled inside the pipeline. This catches the rest,
    // such as a panicking transport while sending notices. Any workspace
    // still held is dropped with the unwound future, and its Drop removes
    // the files.
    let finished = AssertUnwindSafe(pipeline.run(job)).catch_unwind().await;
    let outcome = match finished {
        Ok(outcome) => outcome,
        Err(payload) => {
            let error = JobError::Internal(panic_message(&*payload));
            pipeline
                .abandon(job_id, &reply_target, error, started)
                .await
        }
    };

    drop(permit);
    stats.active.fetch_sub(1, Ordering::SeqCst);
    metrics::JOBS_IN_FLIGHT.dec();
    stats.record(&outcome);
    stats.finish();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::TransformParams;
    use crate::pipeline::Messages;
    use crate::testing::{fixtures, MockConverter, MockTransport, TransportCall};
    use crate::workspace::{WorkspaceConfig, WorkspaceManager};
    use tempfile::TempDir;

    fn dispatcher(
        temp: &TempDir,
        transport: Arc<MockTransport>,
        converter: Arc<MockConverter>,
        config: DispatcherConfig,
    ) -> Dispatcher {
        let workspaces = Arc::new(WorkspaceManager::new(WorkspaceConfig {
            temp_dir: temp.path().to_path_buf(),
        }));
        let pipeline = JobPipeline::new(
            transport,
            converter.clone(),
            converter,
            workspaces,
            TransformParams::default(),
        );
        Dispatcher::new(pipeline, config)
    }

    #[tokio::test]
    async fn test_start_command_creates_no_job() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        let d = dispatcher(
            &temp,
            transport.clone(),
            Arc::new(MockConverter::new()),
            DispatcherConfig::default(),
        );

        let outcome = d.dispatch(fixtures::start_event(3)).await;
        assert!(matches!(outcome, DispatchOutcome::Command));
        assert!(d.drain(Duration::from_secs(1)).await);
        assert_eq!(d.status().total_completed, 0);
    }

    #[tokio::test]
    async fn test_oversized_rejected_without_fetch() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        let d = dispatcher(
            &temp,
            transport.clone(),
            Arc::new(MockConverter::new()),
            DispatcherConfig::default(),
        );

        let outcome = d
            .dispatch(fixtures::video_event("big", 60 * fixtures::MIB, 1))
            .await;
        match outcome {
            DispatchOutcome::Rejected(outcome) => assert_eq!(outcome.reason(), Some("too large")),
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(transport.fetch_count().await, 0);
        assert_eq!(d.status().total_rejected, 1);
    }

    #[tokio::test]
    async fn test_panicking_stage_fails_only_that_job() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        let converter = Arc::new(MockConverter::new());
        converter.panic_on_next_normalize().await;
        let d = dispatcher(
            &temp,
            transport.clone(),
            converter,
            DispatcherConfig::default(),
        );

        let DispatchOutcome::Accepted { handle, .. } =
            d.dispatch(fixtures::video_event("boom", 1024, 1)).await
        else {
            panic!("expected acceptance");
        };
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.reason(), Some("internal error"));
        assert_eq!(d.status().active_jobs, 0);
        assert_eq!(d.status().total_failed, 1);

        let calls = transport.calls().await;
        assert!(calls
            .iter()
            .any(|call| matches!(call, TransportCall::DeleteMessage { .. })));
        let texts = transport.sent_texts().await;
        assert_eq!(
            texts.last().map(String::as_str),
            Some(Messages::default().failure("an internal error occurred").as_str())
        );

        let leftovers = std::fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(leftovers, 0);

        // The next job is unaffected.
        let DispatchOutcome::Accepted { handle, .. } =
            d.dispatch(fixtures::video_event("fine", 1024, 1)).await
        else {
            panic!("expected acceptance");
        };
        assert!(handle.await.unwrap().reason().is_none());
    }

    #[tokio::test]
    async fn test_panic_after_stages_is_caught_by_dispatcher() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        transport
            .panic_on_next_message(&Messages::default().follow_up)
            .await;
        let d = dispatcher(
            &temp,
            transport.clone(),
            Arc::new(MockConverter::new()),
            DispatcherConfig::default(),
        );
        let failed_before = metrics::JOB_DURATION
            .with_label_values(&["failed"])
            .get_sample_count();

        let DispatchOutcome::Accepted { handle, .. } =
            d.dispatch(fixtures::video_event("late-boom", 1024, 2)).await
        else {
            panic!("expected acceptance");
        };
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.reason(), Some("internal error"));
        assert_eq!(d.status().total_failed, 1);
        assert!(
            metrics::JOB_DURATION
                .with_label_values(&["failed"])
                .get_sample_count()
                > failed_before
        );

        let texts = transport.sent_texts().await;
        assert_eq!(
            texts.last().map(String::as_str),
            Some(Messages::default().failure("an internal error occurred").as_str())
        );

        // The held workspace was dropped with the unwound task.
        let leftovers = std::fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_drain_stops_admission() {
        let temp = TempDir::new().unwrap();
        let d = dispatcher(
            &temp,
            Arc::new(MockTransport::new()),
            Arc::new(MockConverter::new()),
            DispatcherConfig::default(),
        );

        assert!(d.drain(Duration::from_millis(100)).await);
        assert!(!d.status().accepting);
        let outcome = d.dispatch(fixtures::video_event("late", 1024, 1)).await;
        assert!(outcome.is_rejected());
    }

    #[tokio::test]
    async fn test_drain_times_out_on_slow_job() {
        let temp = TempDir::new().unwrap();
        let converter = Arc::new(MockConverter::new());
        converter.set_stage_delay(Duration::from_millis(500)).await;
        let d = dispatcher(
            &temp,
            Arc::new(MockTransport::new()),
            converter,
            DispatcherConfig::default(),
        );

        let outcome = d.dispatch(fixtures::video_event("slow", 1024, 1)).await;
        assert!(outcome.is_accepted());
        assert!(!d.drain(Duration::from_millis(20)).await);
        assert!(d.drain(Duration::from_secs(5)).await);
    }
}
