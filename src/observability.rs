use std::net::SocketAddr;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "roomops_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "roomops_command_duration_seconds";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: start requests that hit an open session and needed confirmation.
pub const SESSION_CONFLICTS_TOTAL: &str = "roomops_session_conflicts_total";

/// Counter: sessions force-closed after confirmation.
pub const SESSIONS_FORCE_CLOSED_TOTAL: &str = "roomops_sessions_force_closed_total";

/// Counter: writes to `vacant` rejected by the ready-for-occupation gate.
pub const RFO_REJECTIONS_TOTAL: &str = "roomops_rfo_rejections_total";

/// Counter: inspections recorded. Labels: result.
pub const INSPECTIONS_TOTAL: &str = "roomops_inspections_total";

/// Counter: board re-derivations. Labels: trigger (change, poll, lagged).
pub const BOARD_REFRESHES_TOTAL: &str = "roomops_board_refreshes_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: number of loaded property engines.
pub const PROPERTIES_ACTIVE: &str = "roomops_properties_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomops_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (commits per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomops_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "roomops_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Record outcome and latency of one engine command.
pub fn record_command<T>(
    command: &'static str,
    started: std::time::Instant,
    result: &Result<T, EngineError>,
) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(COMMANDS_TOTAL, "command" => command, "status" => status).increment(1);
    metrics::histogram!(COMMAND_DURATION_SECONDS, "command" => command)
        .record(started.elapsed().as_secs_f64());
}
