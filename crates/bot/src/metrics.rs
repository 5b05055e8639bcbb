//! Prometheus metrics for the bot process.
//!
//! Telegram API traffic is tracked here; job and pipeline metrics come from
//! `roundnote_core::metrics` and are registered into the same registry.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tracing::warn;

use roundnote_core::DispatcherStatus;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Bot API requests by method and result.
pub static TELEGRAM_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "roundnote_telegram_requests_total",
            "Total Telegram Bot API requests",
        ),
        &["method", "result"],
    )
    .unwrap()
});

/// Bot API request duration in seconds.
pub static TELEGRAM_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "roundnote_telegram_request_duration_seconds",
            "Telegram Bot API request duration in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["method"],
    )
    .unwrap()
});

/// Updates received from long polling, by kind.
pub static UPDATES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("roundnote_updates_total", "Telegram updates received"),
        &["kind"],
    )
    .unwrap()
});

/// 1 while the dispatcher admits new jobs.
pub static ACCEPTING_JOBS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "roundnote_accepting_jobs",
        "Whether new jobs are being admitted",
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(TELEGRAM_REQUESTS_TOTAL.clone()),
        Box::new(TELEGRAM_REQUEST_DURATION.clone()),
        Box::new(UPDATES_TOTAL.clone()),
        Box::new(ACCEPTING_JOBS.clone()),
    ];

    for metric in collectors
        .into_iter()
        .chain(roundnote_core::metrics::all_metrics())
    {
        if let Err(e) = registry.register(metric) {
            warn!(error = %e, "Failed to register metric");
        }
    }
}

/// Update gauges that are read from the dispatcher rather than pushed.
pub fn collect_dynamic_metrics(status: &DispatcherStatus) {
    ACCEPTING_JOBS.set(i64::from(status.accepting));
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_bot_and_core_metrics() {
        TELEGRAM_REQUESTS_TOTAL
            .with_label_values(&["getUpdates", "ok"])
            .inc();
        UPDATES_TOTAL.with_label_values(&["video"]).inc();
        roundnote_core::metrics::JOBS_TOTAL
            .with_label_values(&["completed"])
            .inc();

        let text = encode_metrics();
        assert!(text.contains("roundnote_telegram_requests_total"));
        assert!(text.contains("roundnote_updates_total"));
        assert!(text.contains("roundnote_jobs_total"));
    }
}
