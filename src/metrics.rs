//! Process-local self metrics of the harness.
//!
//! These describe the harness itself (how many poll rounds it took, how slow
//! the metrics backend answered) and are dumped once at the end of a run.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_gauge, Encoder, HistogramVec,
    IntCounter, IntGauge, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    pub static ref BALANCE_POLLS: IntCounter = register_int_counter!(
        "bench_balance_polls_total",
        "Total number of balance evaluation rounds"
    ).expect("bench_balance_polls_total registers once");

    pub static ref BALANCE_FETCH_FAILURES: IntCounter = register_int_counter!(
        "bench_balance_fetch_failures_total",
        "Total number of failed metric fetches while polling"
    ).expect("bench_balance_fetch_failures_total registers once");

    pub static ref UNSTABLE_NODES: IntGauge = register_int_gauge!(
        "bench_unstable_nodes",
        "Nodes judged unstable or incomplete in the last round"
    ).expect("bench_unstable_nodes registers once");

    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "bench_query_duration_seconds",
        "Metrics backend query duration in seconds",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]
    ).expect("bench_query_duration_seconds registers once");
}

/// Observes the elapsed time into [`QUERY_DURATION`] when dropped.
pub struct QueryTimer {
    kind: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            start: Instant::now(),
        }
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        QUERY_DURATION.with_label_values(&[self.kind]).observe(duration);
    }
}

pub fn record_poll() {
    BALANCE_POLLS.inc();
}

pub fn record_fetch_failure() {
    BALANCE_FETCH_FAILURES.inc();
}

pub fn set_unstable_nodes(count: usize) {
    UNSTABLE_NODES.set(count as i64);
}

/// Text exposition of everything in the default registry.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
