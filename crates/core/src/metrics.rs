//! Metrics definitions for the wallet engine.
//!
//! This module defines all metrics used throughout the engine.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "wallet_operations_total",
        "Total number of wallet operations by operation and outcome"
    );
    describe_counter!(
        "wallet_transfers_confirmed_total",
        "Total number of peer transfers committed"
    );
    describe_counter!(
        "wallet_transfers_expired_total",
        "Total number of pending transfers cancelled by expiry"
    );
    describe_counter!(
        "wallet_optimistic_conflicts_total",
        "Total number of writes rejected by the version check"
    );
    describe_histogram!(
        "wallet_commit_duration_seconds",
        "Time taken by the two-wallet transfer commit in seconds"
    );
}

/// Record the outcome of a wallet operation.
///
/// # Arguments
/// * `operation` - Operation name (e.g. "deposit", "confirm_transfer")
/// * `outcome` - "ok" or the error kind code
pub fn record_operation(operation: &'static str, outcome: &'static str) {
    counter!("wallet_operations_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
}

/// Record a committed peer transfer.
pub fn record_transfer_confirmed(currency: &'static str) {
    counter!("wallet_transfers_confirmed_total", "currency" => currency).increment(1);
}

/// Record pending transfers cancelled by the expiry sweep.
pub fn record_transfers_expired(count: u64) {
    counter!("wallet_transfers_expired_total").increment(count);
}

/// Record a write that lost the optimistic version check.
pub fn record_conflict(operation: &'static str) {
    counter!("wallet_optimistic_conflicts_total", "operation" => operation).increment(1);
}

/// Record commit duration.
pub fn record_commit_duration(duration_secs: f64) {
    histogram!("wallet_commit_duration_seconds").record(duration_secs);
}

/// A timer that automatically records commit duration when dropped.
pub struct CommitTimer {
    start: Instant,
}

impl CommitTimer {
    /// Start a new commit timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for CommitTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CommitTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_commit_duration(duration);
    }
}
