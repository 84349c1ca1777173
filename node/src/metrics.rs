//! # Prometheus Metrics
//!
//! Operational counters for a scenario run, rendered in the Prometheus text
//! exposition format so they can be dropped into a node-exporter textfile
//! directory or diffed between runs.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Holds all Prometheus metric handles for a run.
#[derive(Clone)]
pub struct VaultMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Vaults created.
    pub vaults_created_total: IntCounter,
    /// Successful deposits.
    pub deposits_total: IntCounter,
    /// Successful redemptions.
    pub redemptions_total: IntCounter,
    /// Successful reserve claims (including zero-amount claims).
    pub claims_total: IntCounter,
    /// Asset units deposited into vaults.
    pub assets_deposited_total: IntCounter,
    /// Asset units paid out by redemptions.
    pub assets_redeemed_total: IntCounter,
    /// Asset units paid out to creators by claims.
    pub reserve_claimed_total: IntCounter,
    /// Rejected operations, labelled by error kind.
    pub operations_failed_total: IntCounterVec,
    /// Wall-clock time per scenario step in seconds.
    pub step_latency_seconds: Histogram,
}

impl VaultMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("poolvault".into()), None)?;

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let vaults_created_total = counter("vaults_created_total", "Total number of vaults created")?;
        let deposits_total = counter("deposits_total", "Total number of successful deposits")?;
        let redemptions_total =
            counter("redemptions_total", "Total number of successful redemptions")?;
        let claims_total = counter("claims_total", "Total number of successful reserve claims")?;
        let assets_deposited_total = counter(
            "assets_deposited_total",
            "Asset units deposited into vaults",
        )?;
        let assets_redeemed_total = counter(
            "assets_redeemed_total",
            "Asset units paid out by share redemptions",
        )?;
        let reserve_claimed_total = counter(
            "reserve_claimed_total",
            "Asset units paid to vault creators from reserves",
        )?;

        let operations_failed_total = IntCounterVec::new(
            Opts::new(
                "operations_failed_total",
                "Rejected vault operations by error kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(operations_failed_total.clone()))?;

        let step_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "step_latency_seconds",
                "Wall-clock time to execute one scenario step in seconds",
            )
            .buckets(vec![
                0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1,
            ]),
        )?;
        registry.register(Box::new(step_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            vaults_created_total,
            deposits_total,
            redemptions_total,
            claims_total,
            assets_deposited_total,
            assets_redeemed_total,
            reserve_claimed_total,
            operations_failed_total,
            step_latency_seconds,
        })
    }

    /// Records a rejected operation.
    pub fn record_failure(&self, kind: &str) {
        self.operations_failed_total.with_label_values(&[kind]).inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
