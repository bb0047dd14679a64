//! Prometheus metrics for the click-stream worker
//!
//! Counters are labelled by stream key. No HTTP endpoint is exposed;
//! `gather_metrics()` returns the text exposition and the worker logs a
//! per-stream summary on shutdown.

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, TextEncoder, opts, register_int_counter_vec};

// ============================================================================
// Stream Consumer Metrics
// ============================================================================

/// Batches handled, by outcome (acked / retrying / dead_lettered)
pub static STREAM_BATCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "clickstream_batches_total",
            "Batches handled by the stream consumer, by outcome"
        ),
        &["stream", "outcome"]
    )
    .expect("Failed to register STREAM_BATCHES_TOTAL metric")
});

/// Messages acknowledged (processed or dead-lettered)
pub static STREAM_MESSAGES_ACKED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "clickstream_messages_acked_total",
            "Messages acknowledged to the consumer group"
        ),
        &["stream"]
    )
    .expect("Failed to register STREAM_MESSAGES_ACKED_TOTAL metric")
});

/// Messages appended to the dead-letter stream
pub static STREAM_DEAD_LETTERED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "clickstream_dead_lettered_total",
            "Messages moved to the dead-letter stream"
        ),
        &["stream"]
    )
    .expect("Failed to register STREAM_DEAD_LETTERED_TOTAL metric")
});

/// Loop iterations that ended in an error (read, ack, counters, DLQ)
pub static STREAM_CONSUME_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "clickstream_consume_errors_total",
            "Consume loop iterations that failed"
        ),
        &["stream"]
    )
    .expect("Failed to register STREAM_CONSUME_ERRORS_TOTAL metric")
});

/// Record one handled batch; `acked` is the number of ids acknowledged
pub fn record_batch(stream: &str, outcome: &str, acked: usize) {
    STREAM_BATCHES_TOTAL
        .with_label_values(&[stream, outcome])
        .inc();
    if acked > 0 {
        STREAM_MESSAGES_ACKED_TOTAL
            .with_label_values(&[stream])
            .inc_by(acked as u64);
    }
}

/// Totals for one stream, for shutdown logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub acked: u64,
    pub dead_lettered: u64,
    pub errors: u64,
}

pub fn stream_summary(stream: &str) -> StreamSummary {
    StreamSummary {
        acked: STREAM_MESSAGES_ACKED_TOTAL.with_label_values(&[stream]).get(),
        dead_lettered: STREAM_DEAD_LETTERED_TOTAL.with_label_values(&[stream]).get(),
        errors: STREAM_CONSUME_ERRORS_TOTAL.with_label_values(&[stream]).get(),
    }
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
