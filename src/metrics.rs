//! Metrics collection and export module

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

/// Deployment, transfer and confirmation metrics
pub struct Metrics {
    registry: Registry,

    // Counters
    pub deploy_attempts: IntCounterVec,
    pub deployments_success: IntCounter,
    pub deployments_partial: IntCounter,
    pub deployments_failed: IntCounterVec,
    pub transfers_success: IntCounter,
    pub transfers_failed: IntCounterVec,
    pub transfers_rejected: IntCounter,
    pub confirmation_timeouts: IntCounter,
    pub blockhash_expirations: IntCounter,
    pub balance_query_failures: IntCounter,

    // Histograms
    pub confirmation_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let deploy_attempts = IntCounterVec::new(
            Opts::new("deploy_attempts_total", "Deployment phase attempts"),
            &["phase"],
        )?;

        let deployments_success = IntCounter::with_opts(Opts::new(
            "deployments_success_total",
            "Deployments with mint created and initial supply minted",
        ))?;

        let deployments_partial = IntCounter::with_opts(Opts::new(
            "deployments_partial_total",
            "Deployments whose mint exists but whose initial supply was not minted",
        ))?;

        let deployments_failed = IntCounterVec::new(
            Opts::new(
                "deployments_failed_total",
                "Deployments that failed before a mint was created",
            ),
            &["category"],
        )?;

        let transfers_success =
            IntCounter::with_opts(Opts::new("transfers_success_total", "Confirmed transfers"))?;

        let transfers_failed = IntCounterVec::new(
            Opts::new(
                "transfers_failed_total",
                "Transfers that failed after submission started",
            ),
            &["category"],
        )?;

        let transfers_rejected = IntCounter::with_opts(Opts::new(
            "transfers_rejected_total",
            "Transfers rejected by pre-flight validation",
        ))?;

        let confirmation_timeouts = IntCounter::with_opts(Opts::new(
            "confirmation_timeouts_total",
            "Confirmation waits that lost the timeout race",
        ))?;

        let blockhash_expirations = IntCounter::with_opts(Opts::new(
            "blockhash_expirations_total",
            "Confirmation waits ended by block height exceeding the blockhash validity",
        ))?;

        let balance_query_failures = IntCounter::with_opts(Opts::new(
            "balance_query_failures_total",
            "Balance lookups that failed and reported zero",
        ))?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "confirmation_latency_seconds",
                "Time from submission to confirmation",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 45.0, 60.0]),
        )?;

        registry.register(Box::new(deploy_attempts.clone()))?;
        registry.register(Box::new(deployments_success.clone()))?;
        registry.register(Box::new(deployments_partial.clone()))?;
        registry.register(Box::new(deployments_failed.clone()))?;
        registry.register(Box::new(transfers_success.clone()))?;
        registry.register(Box::new(transfers_failed.clone()))?;
        registry.register(Box::new(transfers_rejected.clone()))?;
        registry.register(Box::new(confirmation_timeouts.clone()))?;
        registry.register(Box::new(blockhash_expirations.clone()))?;
        registry.register(Box::new(balance_query_failures.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;

        Ok(Self {
            registry,
            deploy_attempts,
            deployments_success,
            deployments_partial,
            deployments_failed,
            transfers_success,
            transfers_failed,
            transfers_rejected,
            confirmation_timeouts,
            blockhash_expirations,
            balance_query_failures,
            confirmation_latency,
        })
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

static METRICS: Lazy<Option<Metrics>> = Lazy::new(|| match Metrics::new() {
    Ok(metrics) => Some(metrics),
    Err(e) => {
        tracing::warn!(error = %e, "Failed to initialize metrics, recording disabled");
        None
    }
});

/// Global metrics instance; `None` only if registration failed
pub fn metrics() -> Option<&'static Metrics> {
    METRICS.as_ref()
}

/// Run `f` against the global metrics, if available
pub fn record<F: FnOnce(&Metrics)>(f: F) {
    if let Some(m) = metrics() {
        f(m);
    }
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.deploy_attempts.with_label_values(&["mint-creation"]).inc();
        metrics.transfers_rejected.inc();
        metrics.deployments_failed.with_label_values(&["timeout"]).inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("deployments_failed_total{category=\"timeout\"} 1"));
        assert!(text.contains("deploy_attempts_total{phase=\"mint-creation\"} 1"));
        assert!(text.contains("transfers_rejected_total 1"));
    }

    #[test]
    fn test_global_metrics_available() {
        let before = metrics().unwrap().balance_query_failures.get();
        record(|m| m.balance_query_failures.inc());
        assert!(metrics().unwrap().balance_query_failures.get() > before);
    }

    #[test]
    fn test_timer_observes() {
        let metrics = Metrics::new().unwrap();
        let timer = Timer::new();
        timer.observe_duration(&metrics.confirmation_latency);
        assert_eq!(metrics.confirmation_latency.get_sample_count(), 1);
    }
}
