use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings accepted and persisted. Labels: kind.
pub const BOOKINGS_CREATED_TOTAL: &str = "reserva_bookings_created_total";

/// Counter: booking requests rejected by validation. Labels: kind.
pub const BOOKINGS_REJECTED_TOTAL: &str = "reserva_bookings_rejected_total";

/// Counter: state-machine transitions. Labels: to.
pub const TRANSITIONS_TOTAL: &str = "reserva_booking_transitions_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: venues currently in the catalog.
pub const VENUES_ACTIVE: &str = "reserva_venues_active";

/// Counter: bearer tokens that failed to resolve.
pub const AUTH_FAILURES_TOTAL: &str = "reserva_auth_failures_total";

/// Histogram: WAL append (flush + fsync) duration in seconds.
pub const WAL_APPEND_DURATION_SECONDS: &str = "reserva_wal_append_duration_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
