//! Prometheus counters published by the poller, notifier and cache.
//!
//! Each [`Metrics`] owns its own registry so tests and multiple apps in one
//! process never collide on registration.

use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// `api_type` label values for the three external collaborators.
pub const API_SOURCE: &str = "source";
pub const API_GENERATOR: &str = "generator";
pub const API_WEBHOOK: &str = "webhook";

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub jobs_seen: IntCounter,
    pub jobs_processed: IntCounter,
    pub jobs_delivered: IntCounter,
    pub jobs_failed: IntCounter,
    pub jobs_qualified: IntCounter,
    pub delivery_attempts: IntCounter,
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub source_fetch_errors: IntCounter,
    pub jobs_pending: IntGauge,
    pub api_requests: IntCounterVec,
    pub api_errors: IntCounterVec,
    pub api_latency: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let jobs_seen = counter("jobs_seen_total", "Jobs recorded as new")?;
        let jobs_processed = counter("jobs_processed_total", "Jobs scored with generated content")?;
        let jobs_delivered = counter("jobs_delivered_total", "Jobs delivered to the webhook")?;
        let jobs_failed = counter("jobs_failed_total", "Jobs moved to failed")?;
        let jobs_qualified = counter("jobs_qualified_total", "Processed jobs at or above the threshold")?;
        let delivery_attempts = counter("delivery_attempts_total", "Webhook calls made")?;
        let cache_hits = counter("cache_hits_total", "Content cache hits")?;
        let cache_misses = counter("cache_misses_total", "Content cache misses")?;
        let source_fetch_errors = counter("source_fetch_errors_total", "Failed listing fetches")?;

        let jobs_pending = IntGauge::new("jobs_pending", "Jobs waiting for scoring after the last tick")?;
        registry.register(Box::new(jobs_pending.clone()))?;

        let api_requests = IntCounterVec::new(
            Opts::new("api_requests_total", "Calls made to external collaborators"),
            &["api_type"],
        )?;
        registry.register(Box::new(api_requests.clone()))?;

        let api_errors = IntCounterVec::new(
            Opts::new("api_errors_total", "Failed calls to external collaborators"),
            &["api_type", "error_type"],
        )?;
        registry.register(Box::new(api_errors.clone()))?;

        let api_latency = HistogramVec::new(
            HistogramOpts::new("api_latency_seconds", "External call latency in seconds")
                .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0]),
            &["api_type"],
        )?;
        registry.register(Box::new(api_latency.clone()))?;

        Ok(Self {
            registry,
            jobs_seen,
            jobs_processed,
            jobs_delivered,
            jobs_failed,
            jobs_qualified,
            delivery_attempts,
            cache_hits,
            cache_misses,
            source_fetch_errors,
            jobs_pending,
            api_requests,
            api_errors,
            api_latency,
        })
    }

    /// Record one external call. `error` is the failure kind, if it failed.
    pub fn observe_call(&self, api_type: &str, elapsed: Duration, error: Option<&str>) {
        self.api_requests.with_label_values(&[api_type]).inc();
        self.api_latency
            .with_label_values(&[api_type])
            .observe(elapsed.as_secs_f64());
        if let Some(error_type) = error {
            self.api_errors
                .with_label_values(&[api_type, error_type])
                .inc();
        }
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lists_all_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.jobs_seen.inc();
        metrics.delivery_attempts.inc_by(3);
        metrics.observe_call(API_SOURCE, Duration::from_millis(300), None);
        metrics.observe_call(API_GENERATOR, Duration::from_secs(3), Some("timeout"));
        metrics.observe_call(API_WEBHOOK, Duration::from_millis(80), Some("status"));

        let text = metrics.render().unwrap();
        for name in [
            "jobs_seen_total",
            "jobs_processed_total",
            "jobs_delivered_total",
            "jobs_failed_total",
            "delivery_attempts_total",
            "cache_hits_total",
            "cache_misses_total",
            "api_requests_total",
            "api_errors_total",
            "api_latency_seconds",
        ] {
            assert!(text.contains(name), "missing {name}");
        }
        assert!(text.contains("jobs_seen_total 1"));
        assert!(text.contains("delivery_attempts_total 3"));
        assert!(text.contains(r#"api_requests_total{api_type="generator"} 1"#));
        assert!(text.contains(r#"api_errors_total{api_type="generator",error_type="timeout"} 1"#));
        assert!(text.contains(r#"api_errors_total{api_type="webhook",error_type="status"} 1"#));
        assert!(text.contains(r#"api_latency_seconds_count{api_type="source"} 1"#));
        assert!(!text.contains(r#"api_errors_total{api_type="source""#));
    }

    #[test]
    fn instances_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.jobs_failed.inc();
        assert_eq!(a.jobs_failed.get(), 1);
        assert_eq!(b.jobs_failed.get(), 0);
    }
}
