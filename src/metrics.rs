//! Prometheus metrics for account setup and funding

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

pub struct Metrics {
    registry: Registry,

    // Counters
    pub txs_signed: IntCounterVec,
    pub tx_submit_failures: IntCounterVec,
    pub guaranteed_retry_attempts: IntCounter,
    pub distribution_transfers: IntCounter,

    // Gauges
    pub distribution_active_subtrees: IntGauge,

    // Histograms
    pub inclusion_wait: Histogram,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let txs_signed = IntCounterVec::new(
            Opts::new("txs_signed_total", "Transactions signed, by payload kind"),
            &["kind"],
        )?;

        let tx_submit_failures = IntCounterVec::new(
            Opts::new(
                "tx_submit_failures_total",
                "Failed submissions, by transport error category",
            ),
            &["category"],
        )?;

        let guaranteed_retry_attempts = IntCounter::with_opts(Opts::new(
            "guaranteed_retry_attempts_total",
            "Retried attempts of must-succeed transfers",
        ))?;

        let distribution_transfers = IntCounter::with_opts(Opts::new(
            "distribution_transfers_total",
            "Transfers executed by hierarchical distribution",
        ))?;

        let distribution_active_subtrees = IntGauge::with_opts(Opts::new(
            "distribution_active_subtrees",
            "Distribution subtrees currently running",
        ))?;

        let inclusion_wait = Histogram::with_opts(
            HistogramOpts::new("inclusion_wait_seconds", "Time spent waiting for receipts")
                .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )?;

        registry.register(Box::new(txs_signed.clone()))?;
        registry.register(Box::new(tx_submit_failures.clone()))?;
        registry.register(Box::new(guaranteed_retry_attempts.clone()))?;
        registry.register(Box::new(distribution_transfers.clone()))?;
        registry.register(Box::new(distribution_active_subtrees.clone()))?;
        registry.register(Box::new(inclusion_wait.clone()))?;

        Ok(Self {
            registry,
            txs_signed,
            tx_submit_failures,
            guaranteed_retry_attempts,
            distribution_transfers,
            distribution_active_subtrees,
            inclusion_wait,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Measures an operation and records it into a histogram
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
