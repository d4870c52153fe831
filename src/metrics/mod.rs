//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Submissions and broadcast rejections
//! - Confirmation outcomes and latency
//! - Fee suggestions

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

lazy_static! {
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "tesseract_submitter_transactions_submitted_total",
        "Total transactions accepted by the network",
        &["kind"]
    ).unwrap();

    pub static ref TX_REJECTED: CounterVec = register_counter_vec!(
        "tesseract_submitter_transactions_rejected_total",
        "Total broadcasts refused by the network",
        &["reason"]
    ).unwrap();

    pub static ref CONFIRMATIONS: CounterVec = register_counter_vec!(
        "tesseract_submitter_confirmations_total",
        "Terminal confirmation outcomes",
        &["result"]
    ).unwrap();

    pub static ref CONFIRMATION_LATENCY: HistogramVec = register_histogram_vec!(
        "tesseract_submitter_confirmation_latency_seconds",
        "Time from tracking start to terminal outcome",
        &["result"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    pub static ref SUGGESTED_FEE_GWEI: Gauge = register_gauge!(
        "tesseract_submitter_suggested_fee_gwei",
        "Last fee per unit suggested by the network"
    ).unwrap();
}

/// Render all registered metrics in the text exposition format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

// Helper functions to record metrics

pub fn record_tx_submitted(kind: &str) {
    TX_SUBMITTED.with_label_values(&[kind]).inc();
}

pub fn record_tx_rejected(reason: &str) {
    TX_REJECTED.with_label_values(&[reason]).inc();
}

pub fn record_confirmation(result: &str, latency_secs: f64) {
    CONFIRMATIONS.with_label_values(&[result]).inc();
    CONFIRMATION_LATENCY
        .with_label_values(&[result])
        .observe(latency_secs);
}

pub fn record_suggested_fee(gwei: f64) {
    SUGGESTED_FEE_GWEI.set(gwei);
}
