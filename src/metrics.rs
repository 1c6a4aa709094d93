// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the submodel store.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding service is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `submodel_store_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: create_submodel, get_submodel, add_element, ...
//! - `status`: success, error
//! - `kind`: not_found, bad_request, conflict, internal
//! - `table`: target table of a bulk insert

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

use crate::error::StoreError;

/// Record a finished repository operation
pub fn record_operation(operation: &str, status: &str) {
    counter!(
        "submodel_store_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "submodel_store_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TRACKING - Categorized error counters for alerting
// ═══════════════════════════════════════════════════════════════════════════

/// Record an error with its taxonomy kind
pub fn record_error(operation: &str, kind: &str) {
    counter!(
        "submodel_store_errors_total",
        "operation" => operation.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record the outcome of an operation result, success or failure
pub fn record_result<T>(operation: &str, result: &Result<T, StoreError>) {
    match result {
        Ok(_) => record_operation(operation, "success"),
        Err(e) => {
            record_operation(operation, "error");
            record_error(operation, e.kind());
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// BATCH INSERTS
// ═══════════════════════════════════════════════════════════════════════════

/// Record rows written by one bulk insert
pub fn record_batch_rows(table: &str, rows: usize) {
    histogram!(
        "submodel_store_batch_rows",
        "table" => table.to_string()
    )
    .record(rows as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// FAN-OUT
// ═══════════════════════════════════════════════════════════════════════════

/// Set number of fan-out workers currently holding a permit
pub fn set_fetch_workers_busy(count: usize) {
    gauge!("submodel_store_fetch_workers_busy").set(count as f64);
}

/// Record a fan-out worker timing out
pub fn record_timeout(operation: &str) {
    counter!(
        "submodel_store_timeouts_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// CACHE
// ═══════════════════════════════════════════════════════════════════════════

/// Record submodel cache hit/miss
pub fn record_cache(hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    counter!(
        "submodel_store_cache_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Record startup phase duration
pub fn record_startup_phase(phase: &str, duration: Duration) {
    histogram!(
        "submodel_store_startup_seconds",
        "phase" => phase.to_string()
    )
    .record(duration.as_secs_f64());
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These only check the API does not panic without a recorder installed.

    #[test]
    fn test_record_operation() {
        record_operation("get_submodel", "success");
        record_operation("add_element", "error");
        record_latency("delete_submodel", Duration::from_millis(5));
    }

    #[test]
    fn test_record_result() {
        record_result::<()>("get_submodel", &Ok(()));
        record_result::<()>("get_submodel", &Err(StoreError::NotFound("x".into())));
    }

    #[test]
    fn test_batch_and_fanout_metrics() {
        record_batch_rows("submodel_element", 1000);
        set_fetch_workers_busy(3);
        record_timeout("get_submodels");
        record_cache(true);
        record_cache(false);
        record_startup_phase("schema", Duration::from_millis(12));
    }

    #[test]
    fn test_latency_timer() {
        {
            let _timer = LatencyTimer::new("get_submodel");
            std::thread::sleep(Duration::from_micros(10));
        }
    }
}
