use fpg_telemetry::{
    TelemetryMetrics, metrics, record_discovery_run, record_field_attempt, record_point_write,
};

#[test]
fn fresh_metrics_start_at_zero() {
    let metrics = TelemetryMetrics::new();
    assert_eq!(metrics.snapshot(), Default::default());
}

#[test]
fn counters_accumulate() {
    // 全局实例在测试间共享，只比较增量
    let before = metrics().snapshot();
    record_point_write(false);
    record_field_attempt(1);
    record_field_attempt(2);
    record_discovery_run(3);
    let after = metrics().snapshot();

    assert!(after.point_writes >= before.point_writes + 1);
    assert!(after.point_write_failures >= before.point_write_failures + 1);
    assert!(after.field_attempts >= before.field_attempts + 2);
    assert!(after.field_retries >= before.field_retries + 1);
    assert!(after.devices_discovered >= before.devices_discovered + 3);
}
