use std::net::SocketAddr;

use crate::wire::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total operations executed. Labels: op, status.
pub const OPS_TOTAL: &str = "valet_ops_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OP_DURATION_SECONDS: &str = "valet_op_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "valet_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "valet_connections_total";

/// Counter: connections rejected due to the permit limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "valet_connections_rejected_total";

/// Gauge: spots currently occupied.
pub const SPOTS_OCCUPIED: &str = "valet_spots_occupied";

/// Counter: notifications dispatched to the hub.
pub const NOTICES_TOTAL: &str = "valet_notices_total";

/// Counter: preorder reservations expired by the monitor.
pub const MONITOR_EXPIRED_TOTAL: &str = "valet_monitor_expired_total";

/// Counter: late-pickup notices issued by the monitor.
pub const MONITOR_LATE_NOTICES_TOTAL: &str = "valet_monitor_late_notices_total";

/// Counter: ownership/authorization denials.
pub const ACCESS_DENIED_TOTAL: &str = "valet_access_denied_total";

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

/// Map a Request variant to a short label for metrics.
pub fn op_label(req: &Request) -> &'static str {
    match req {
        Request::CheckAvailability => "check_availability",
        Request::MakeReservation { .. } => "make_reservation",
        Request::CancelReservation { .. } => "cancel_reservation",
        Request::EnterWalkIn { .. } => "enter_walk_in",
        Request::EnterWithReservation { .. } => "enter_with_reservation",
        Request::Exit { .. } => "exit",
        Request::Extend { .. } => "extend",
        Request::RecoverCode { .. } => "recover_code",
        Request::History { .. } => "history",
        Request::ActiveSessions => "active_sessions",
        Request::RegisterSubscriber { .. } => "register_subscriber",
        Request::UpdateSubscriber { .. } => "update_subscriber",
    }
}
