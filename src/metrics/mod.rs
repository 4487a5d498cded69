//! Metrics module
//!
//! Provides Prometheus metrics for transfers, waves and store errors.

#[cfg(feature = "metrics")]
pub mod server;

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec,
    register_int_counter, register_int_gauge, Counter, CounterVec, Histogram, HistogramVec,
    IntCounter, IntGauge,
};

lazy_static! {
    // Transfer metrics
    pub static ref TRANSFERS_TOTAL: CounterVec = register_counter_vec!(
        "loadgen_transfers_total",
        "Total number of transfers by outcome",
        &["mode", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "loadgen_upload_bytes_total",
        "Total bytes acknowledged by the store"
    ).unwrap();

    pub static ref TRANSFER_DURATION: HistogramVec = register_histogram_vec!(
        "loadgen_transfer_duration_seconds",
        "Transfer duration in seconds, delete included",
        &["mode"],
        vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    ).unwrap();

    // Multipart metrics
    pub static ref MULTIPART_PARTS: Histogram = register_histogram!(
        "loadgen_multipart_parts",
        "Number of parts per completed multipart upload",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 10000.0]
    ).unwrap();

    pub static ref ABORTS_TOTAL: CounterVec = register_counter_vec!(
        "loadgen_multipart_aborts_total",
        "Multipart abort attempts",
        &["status"]
    ).unwrap();

    // Wave metrics
    pub static ref WAVES_TOTAL: IntCounter = register_int_counter!(
        "loadgen_waves_total",
        "Completed waves"
    ).unwrap();

    pub static ref WAVE_DURATION: Histogram = register_histogram!(
        "loadgen_wave_duration_seconds",
        "Wall time of one wave",
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]
    ).unwrap();

    pub static ref TRANSFERS_IN_FLIGHT: IntGauge = register_int_gauge!(
        "loadgen_transfers_in_flight",
        "Transfers currently running"
    ).unwrap();

    // Error metrics
    pub static ref STORE_ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "loadgen_store_errors_total",
        "Store errors by phase and remote error code",
        &["phase", "code"]
    ).unwrap();
}

/// Record a finished transfer
pub fn record_transfer(mode: &str, status: &str, duration_secs: f64) {
    TRANSFERS_TOTAL.with_label_values(&[mode, status]).inc();
    TRANSFER_DURATION
        .with_label_values(&[mode])
        .observe(duration_secs);
}

/// Record bytes the store acknowledged
pub fn record_upload_bytes(bytes: u64) {
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a completed multipart upload
pub fn record_multipart_complete(parts_count: usize) {
    MULTIPART_PARTS.observe(parts_count as f64);
}

/// Record an abort attempt
pub fn record_abort(success: bool) {
    let status = if success { "success" } else { "failure" };
    ABORTS_TOTAL.with_label_values(&[status]).inc();
}

/// Record a store error
pub fn record_store_error(phase: &str, code: &str) {
    STORE_ERRORS_TOTAL.with_label_values(&[phase, code]).inc();
}

/// Record a finished wave
pub fn record_wave(duration_secs: f64) {
    WAVES_TOTAL.inc();
    WAVE_DURATION.observe(duration_secs);
}

/// Holds one slot of the in-flight gauge until dropped.
///
/// Dropping also runs during unwinding, so a panicking transfer gives its
/// slot back.
#[must_use = "the transfer counts as in flight only while the guard lives"]
pub struct InFlightGuard(());

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        TRANSFERS_IN_FLIGHT.dec();
    }
}

/// Count a transfer as in flight for the lifetime of the returned guard
pub fn transfer_in_flight() -> InFlightGuard {
    TRANSFERS_IN_FLIGHT.inc();
    InFlightGuard(())
}

/// Transfers currently holding an [`InFlightGuard`]
pub fn transfers_in_flight() -> i64 {
    TRANSFERS_IN_FLIGHT.get()
}
