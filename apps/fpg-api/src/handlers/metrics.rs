//! 计数指标快照。
//!
//! - GET /metrics

use crate::utils::ok;
use api_contract::MetricsSnapshotDto;
use axum::response::Response;
use fpg_telemetry::metrics;

pub async fn get_metrics() -> Response {
    let snapshot = metrics().snapshot();
    ok(MetricsSnapshotDto {
        point_reads: snapshot.point_reads,
        point_read_failures: snapshot.point_read_failures,
        point_writes: snapshot.point_writes,
        point_write_failures: snapshot.point_write_failures,
        writes_refused: snapshot.writes_refused,
        field_attempts: snapshot.field_attempts,
        field_retries: snapshot.field_retries,
        field_latency_ms_total: snapshot.field_latency_ms_total,
        field_latency_ms_count: snapshot.field_latency_ms_count,
        connections_opened: snapshot.connections_opened,
        connection_failures: snapshot.connection_failures,
        discovery_runs: snapshot.discovery_runs,
        devices_discovered: snapshot.devices_discovered,
        maintenance_transitions: snapshot.maintenance_transitions,
    })
}
