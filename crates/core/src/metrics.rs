//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Jobs (outcomes, durations, per-stage timings)
//! - Dispatcher (in-flight and queued jobs)
//! - Workspaces and the encoding tool (cleanup and tool failures)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Jobs
// =============================================================================

/// Jobs reaching a terminal state, by outcome.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("roundnote_jobs_total", "Total jobs by terminal outcome"),
        &["outcome"], // "completed", "failed", "rejected"
    )
    .unwrap()
});

/// End-to-end job duration in seconds.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "roundnote_job_duration_seconds",
            "Duration from start of processing to terminal state",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Duration of each pipeline stage in seconds.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "roundnote_stage_duration_seconds",
            "Duration of individual pipeline stages",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["stage"], // "fetch", "transform", "package", "deliver"
    )
    .unwrap()
});

// =============================================================================
// Dispatcher
// =============================================================================

/// Jobs currently holding a processing slot.
pub static JOBS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("roundnote_jobs_in_flight", "Jobs currently being processed").unwrap()
});

/// Jobs admitted but waiting for a slot.
pub static JOBS_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("roundnote_jobs_queued", "Jobs waiting for a processing slot").unwrap()
});

// =============================================================================
// Cleanup and encoding tool
// =============================================================================

/// Temp paths that could not be removed.
pub static CLEANUP_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "roundnote_cleanup_failures_total",
        "Temporary paths whose removal failed",
    )
    .unwrap()
});

/// Encoding tool failures by stage and kind.
pub static ENCODING_TOOL_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "roundnote_encoding_tool_failures_total",
            "Failures of the external encoding tool",
        ),
        &["stage", "kind"], // kind: "exit_code", "timeout", "tool_missing", ...
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Jobs
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(STAGE_DURATION.clone()),
        // Dispatcher
        Box::new(JOBS_IN_FLIGHT.clone()),
        Box::new(JOBS_QUEUED.clone()),
        // Cleanup and encoding tool
        Box::new(CLEANUP_FAILURES.clone()),
        Box::new(ENCODING_TOOL_FAILURES.clone()),
    ]
}
