use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and describe the feed series.
    pub fn init() -> Result<Self> {
        // Use default buckets to avoid API differences across crate versions.
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_cycles_total", "Merge cycles that ran to completion.");
        describe_counter!(
            "feed_cycle_failures_total",
            "Merge cycles that failed before or during persistence."
        );
        describe_counter!("feed_admitted_total", "Items admitted into the feed.");
        describe_counter!(
            "feed_source_errors_total",
            "Source fetches that failed and were isolated."
        );
        describe_counter!(
            "feed_thread_filtered_total",
            "Items dropped by the conversation thread filter."
        );
        describe_counter!(
            "feed_trigger_rejected_total",
            "Cycle triggers rejected by the single-flight gate or cool-down."
        );
        describe_counter!("feed_sink_errors_total", "Mirror/notification sink failures.");
        describe_gauge!("feed_items", "Items currently in the persisted feed.");
        describe_gauge!("feed_last_cycle_ts", "Unix ts when the last cycle finished.");
        describe_histogram!("feed_cycle_ms", "Cycle wall time in milliseconds.");
    });
}

pub(crate) fn thread_filtered(n: usize) {
    counter!("feed_thread_filtered_total").increment(n as u64);
}

pub(crate) fn source_error(source: &str) {
    counter!("feed_source_errors_total", "source" => source.to_string()).increment(1);
}

pub(crate) fn trigger_rejected(reason: &'static str) {
    counter!("feed_trigger_rejected_total", "reason" => reason).increment(1);
}

pub(crate) fn sink_error(sink: &'static str) {
    counter!("feed_sink_errors_total", "sink" => sink).increment(1);
}

pub(crate) fn cycle_failed() {
    counter!("feed_cycle_failures_total").increment(1);
}

pub(crate) fn cycle_finished(admitted: usize, feed_len: usize, elapsed_ms: f64, now_unix: i64) {
    counter!("feed_cycles_total").increment(1);
    counter!("feed_admitted_total").increment(admitted as u64);
    gauge!("feed_items").set(feed_len as f64);
    gauge!("feed_last_cycle_ts").set(now_unix as f64);
    histogram!("feed_cycle_ms").record(elapsed_ms);
}
