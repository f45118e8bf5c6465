use std::net::SocketAddr;
use std::time::Instant;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations executed. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "hotel_operations_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "hotel_operation_duration_seconds";

/// Counter: booking attempts rejected because of an overlapping ACTIVE reservation.
pub const BOOKING_CONFLICTS_TOTAL: &str = "hotel_booking_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: time spent waiting for an exclusivity token, in seconds. Labels: scope.
pub const LOCK_WAIT_SECONDS: &str = "hotel_lock_wait_seconds";

/// Counter: lock acquisitions that timed out (surfaced as Busy). Labels: scope.
pub const LOCK_BUSY_TOTAL: &str = "hotel_lock_busy_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "hotel_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "hotel_wal_flush_batch_size";

/// Gauge: rooms currently OCCUPIED, as of the last occupancy refresh.
pub const ROOMS_OCCUPIED: &str = "hotel_rooms_occupied";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Count and time one engine operation.
pub fn record_op<T>(op: &'static str, result: &Result<T, EngineError>, started: Instant) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.label(),
    };
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}
