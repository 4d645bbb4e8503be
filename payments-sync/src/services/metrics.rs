//! Metrics collection and Prometheus export.
//!
//! Recording goes through the `metrics` facade. Without an installed
//! recorder (one-shot CLI runs) every call is a no-op.

use crate::models::RecordKind;
use crate::services::store::UpsertOutcome;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Global handle to the Prometheus recorder.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics recorder.
///
/// Called once by `serve` before the listener starts. Panics if called more
/// than once.
pub fn init_metrics() {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if METRICS_HANDLE.set(handle).is_err() {
        panic!("failed to set metrics handle: already initialized");
    }
}

/// Current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized".to_string())
}

pub fn record_page_fetched(kind: RecordKind, records: usize) {
    metrics::counter!("sync_pages_fetched_total", "kind" => kind.as_str()).increment(1);
    metrics::counter!("sync_records_fetched_total", "kind" => kind.as_str())
        .increment(records as u64);
}

pub fn record_page_error(kind: RecordKind) {
    metrics::counter!("sync_page_errors_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_upsert(kind: RecordKind, outcome: UpsertOutcome) {
    metrics::counter!(
        "sync_records_upserted_total",
        "kind" => kind.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_batch_flush(kind: RecordKind, elapsed: Duration) {
    metrics::histogram!("sync_batch_flush_seconds", "kind" => kind.as_str())
        .record(elapsed.as_secs_f64());
}

pub fn record_candidate(rule: &str, outcome: &'static str) {
    metrics::counter!(
        "reconcile_candidates_total",
        "rule" => rule.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_store_query(operation: &'static str, started: Instant) {
    metrics::histogram!("store_query_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}
