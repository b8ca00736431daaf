//! Prometheus metrics for the recorder

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge_vec, register_histogram_vec,
    Counter, CounterVec, Encoder, GaugeVec, HistogramVec, TextEncoder,
};

// ── Event intake ─────────────────────────────────────────────────────────────

pub static EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "rollcall_presence_events_total",
        "Presence events received from the source",
        &["kind"]
    )
    .unwrap()
});

pub static EVENTS_DROPPED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "rollcall_presence_events_dropped_total",
        "Presence events dropped before reaching a queue",
        &["reason"]
    )
    .unwrap()
});

pub static SOURCE_RECONNECTS: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "rollcall_source_reconnects_total",
        "Reconnects triggered by source disconnections"
    )
    .unwrap()
});

// ── Queue metrics ────────────────────────────────────────────────────────────

pub static QUEUE_BACKLOG: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "rollcall_queue_backlog",
        "Tasks admitted to a queue and not yet started",
        &["queue"]
    )
    .unwrap()
});

pub static QUEUE_TASKS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "rollcall_queue_tasks_total",
        "Tasks finished per queue",
        &["queue", "status"]
    )
    .unwrap()
});

pub static QUEUE_TASK_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "rollcall_queue_task_duration_seconds",
        "Time spent on one task, including store I/O and identity polling",
        &["queue"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap()
});

pub static DEAD_LETTERS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "rollcall_dead_letters_total",
        "Failed tasks handed to a dead-letter sink",
        &["queue", "error"]
    )
    .unwrap()
});

// ── Ledger metrics ───────────────────────────────────────────────────────────

pub static PARTITIONS_CREATED: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "rollcall_partitions_created_total",
        "Partitions created on first use"
    )
    .unwrap()
});

pub static PARTITION_RESIZES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "rollcall_partition_resizes_total",
        "Partitions grown because a scan ran past their bounds",
        &["partition"]
    )
    .unwrap()
});

pub static ROWS_SCANNED: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "rollcall_rows_scanned_total",
        "Cells read while searching for a free or matching row"
    )
    .unwrap()
});

pub static IDENTITY_POLLS: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "rollcall_identity_polls_total",
        "Identity lookups issued while waiting for a display name"
    )
    .unwrap()
});

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_metrics_are_rendered() {
        QUEUE_TASKS.with_label_values(&["metrics-test", "ok"]).inc();
        let text = encode_metrics();
        assert!(text.contains("rollcall_queue_tasks_total"));
    }
}
