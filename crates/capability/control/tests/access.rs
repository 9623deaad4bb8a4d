mod common;

use common::{Step, bound, harness, point, rtu_config};
use domain::{CallerContext, ChannelType, ConnectionState, GatewayError, PointValue};
use fpg_protocol::CallOptions;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn chw_meter_read_succeeds_on_third_attempt() {
    let h = harness();
    h.manager
        .add_protocol("chw-meter", rtu_config("/dev/ttyUSB0", 3000, 3))
        .expect("add");
    h.transport.script([
        Step::Hang,
        Step::Timeout,
        Step::Value(PointValue::Float(72.5)),
    ]);

    let started = tokio::time::Instant::now();
    let value = h
        .access
        .read_point("chw-meter", "1", "HR:100:float32")
        .await
        .expect("read");

    assert_eq!(value, PointValue::Float(72.5));
    assert_eq!(h.transport.reads.load(Ordering::SeqCst), 3);
    assert_eq!(h.transport.connects.load(Ordering::SeqCst), 1);
    // 第一次尝试等满 timeout_ms
    assert!(started.elapsed() >= Duration::from_millis(3000));
    assert!(started.elapsed() < Duration::from_millis(9000));
    let status = h.manager.status("chw-meter").expect("status");
    assert_eq!(status.state, ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_surface_last_error() {
    let h = harness();
    h.manager
        .add_protocol("meter", rtu_config("/dev/ttyUSB0", 500, 2))
        .expect("add");
    h.transport.script([Step::Timeout, Step::Timeout, Step::Value(PointValue::Int(1))]);

    let err = h
        .access
        .read_point("meter", "3", "IR:7")
        .await
        .expect_err("timeout");
    assert!(matches!(err, GatewayError::Timeout { timeout_ms: 500, .. }));
    assert_eq!(h.transport.reads.load(Ordering::SeqCst), 2);
    let status = h.manager.status("meter").expect("status");
    assert!(status.last_error.is_some());
}

#[tokio::test]
async fn malformed_address_fails_before_io() {
    let h = harness();
    h.manager
        .add_protocol("meter", rtu_config("/dev/ttyUSB0", 500, 3))
        .expect("add");

    for (device, address) in [("1", "HR:abc"), ("0", "HR:1"), ("1", "XX:1"), ("1", "C:1:float32")] {
        let err = h
            .access
            .read_point("meter", device, address)
            .await
            .expect_err("invalid");
        assert_eq!(err.code(), "FIELD.INVALID_ADDRESS", "{} {}", device, address);
    }
    assert_eq!(h.factory.creates.load(Ordering::SeqCst), 0);
    assert_eq!(h.transport.reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn device_exception_is_not_retried() {
    let h = harness();
    h.manager
        .add_protocol("meter", rtu_config("/dev/ttyUSB0", 500, 3))
        .expect("add");
    h.transport.script([Step::IllegalAddress]);

    let err = h
        .access
        .read_point("meter", "1", "HR:9999")
        .await
        .expect_err("illegal");
    assert!(matches!(err, GatewayError::InvalidAddress { .. }));
    assert_eq!(h.transport.reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn broken_connection_is_reopened_within_the_call() {
    let h = harness();
    h.manager
        .add_protocol("meter", rtu_config("/dev/ttyUSB0", 500, 3))
        .expect("add");
    h.transport
        .script([Step::Broken, Step::Value(PointValue::Bool(true))]);

    let value = h
        .access
        .read_point("meter", "1", "C:4")
        .await
        .expect("read");
    assert_eq!(value, PointValue::Bool(true));
    assert_eq!(h.transport.connects.load(Ordering::SeqCst), 2);
    assert_eq!(h.transport.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_and_disabled_protocols() {
    let h = harness();
    let err = h
        .access
        .read_point("nope", "1", "HR:1")
        .await
        .expect_err("unknown");
    assert!(matches!(err, GatewayError::NotFound(_)));

    h.manager
        .add_protocol("meter", rtu_config("/dev/ttyUSB0", 500, 3))
        .expect("add");
    h.manager.disable_protocol("meter").await.expect("disable");
    let err = h
        .access
        .read_point("meter", "1", "HR:1")
        .await
        .expect_err("disabled");
    assert!(matches!(err, GatewayError::Disabled(_)));
}

#[tokio::test]
async fn automatic_write_refused_during_maintenance_without_io() {
    let h = harness();
    h.manager
        .add_protocol("ahu", rtu_config("/dev/ttyUSB0", 500, 3))
        .expect("add");
    h.maintenance
        .enable_maintenance_mode("damper actuator swap", "j.tech", 30)
        .await
        .expect("enable");

    let err = h
        .access
        .write_point(
            "ahu",
            "2",
            "HR:40",
            PointValue::Float(55.0),
            &CallerContext::automatic("bms"),
        )
        .await
        .expect_err("locked");
    assert!(matches!(err, GatewayError::MaintenanceLocked { .. }));
    assert_eq!(err.code(), "POLICY.MAINTENANCE_LOCKED");
    assert_eq!(h.factory.creates.load(Ordering::SeqCst), 0);
    assert_eq!(h.transport.writes.load(Ordering::SeqCst), 0);

    h.access
        .write_point(
            "ahu",
            "2",
            "HR:40",
            PointValue::Float(55.0),
            &CallerContext::manual("j.tech"),
        )
        .await
        .expect("manual write");
    assert_eq!(h.transport.writes.load(Ordering::SeqCst), 1);

    let records = h.audit_records().await;
    let writes: Vec<_> = records
        .iter()
        .filter(|record| record.action == "POINT.WRITE")
        .collect();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].result, "ok");
    assert_eq!(writes[0].caller, "manual");
    assert_eq!(writes[1].result, "refused");
    assert_eq!(writes[1].actor, "bms");
    assert_eq!(writes[1].resource, "ahu/2/HR:40");
}

#[tokio::test]
async fn write_to_disabled_bound_point_is_refused() {
    let h = harness();
    h.manager
        .add_protocol("ahu", rtu_config("/dev/ttyUSB0", 500, 3))
        .expect("add");
    let mut valve = bound(point("chw-valve", ChannelType::AnalogOutput, 1), "ahu", "2", "HR:41");
    valve.enabled = false;
    h.catalog.upsert_point(valve).expect("point");

    // 同一寄存器的各种写法都落在绑定上
    for (device_id, address) in [
        ("2", "HR:41"),
        ("2", "hr:41"),
        ("02", "HR:41"),
        ("2", "HR:41:uint16"),
        ("2", " HR:41:int16"),
        ("2", "HR:40:float32"),
    ] {
        let err = h
            .access
            .write_point(
                "ahu",
                device_id,
                address,
                PointValue::Float(20.0),
                &CallerContext::manual("op"),
            )
            .await
            .expect_err(address);
        assert!(matches!(err, GatewayError::Disabled(_)), "{address}: {err}");
    }
    assert_eq!(h.transport.writes.load(Ordering::SeqCst), 0);
    assert_eq!(h.transport.connects.load(Ordering::SeqCst), 0);

    // 未绑定的地址不受影响
    h.access
        .write_point(
            "ahu",
            "2",
            "HR:42",
            PointValue::Int(1),
            &CallerContext::automatic("bms"),
        )
        .await
        .expect("unbound write");
}

#[tokio::test]
async fn failed_write_is_audited_as_failed() {
    let h = harness();
    h.manager
        .add_protocol("ahu", rtu_config("/dev/ttyUSB0", 500, 1))
        .expect("add");
    h.transport.script([Step::IllegalAddress]);

    let err = h
        .access
        .write_point(
            "ahu",
            "2",
            "HR:9000",
            PointValue::Int(7),
            &CallerContext::automatic("bms"),
        )
        .await
        .expect_err("exception");
    assert!(matches!(err, GatewayError::InvalidAddress { .. }));
    assert!(h.transport.written.lock().expect("lock").is_empty());

    let records = h.audit_records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].result, "failed");
}

#[tokio::test]
async fn cancelled_before_start() {
    let h = harness();
    h.manager
        .add_protocol("meter", rtu_config("/dev/ttyUSB0", 500, 3))
        .expect("add");
    let token = CancellationToken::new();
    token.cancel();

    let err = h
        .access
        .read_point_with("meter", "1", "HR:1", &CallOptions::with_cancel(token))
        .await
        .expect_err("cancelled");
    assert_eq!(err, GatewayError::Cancelled);
    assert_eq!(h.transport.reads.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_checked_between_attempts() {
    let h = harness();
    h.manager
        .add_protocol("meter", rtu_config("/dev/ttyUSB0", 3000, 3))
        .expect("add");
    h.transport.script([Step::Hang, Step::Value(PointValue::Int(5))]);

    let deadline = tokio::time::Instant::now() + Duration::from_millis(1000);
    let err = h
        .access
        .read_point_with("meter", "1", "HR:1", &CallOptions::with_deadline(deadline))
        .await
        .expect_err("deadline");
    assert_eq!(err, GatewayError::Cancelled);
    // 进行中的尝试不被打断
    assert_eq!(h.transport.reads.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn reads_on_one_protocol_run_one_at_a_time_in_arrival_order() {
    let h = harness();
    h.manager
        .add_protocol("ahu", rtu_config("/dev/ttyUSB0", 1000, 1))
        .expect("add");
    *h.transport.read_delay.lock().expect("lock") = Duration::from_millis(100);

    let started = tokio::time::Instant::now();
    let (first, second, third) = tokio::join!(
        h.access.read_point("ahu", "1", "HR:1"),
        h.access.read_point("ahu", "1", "HR:2"),
        h.access.read_point("ahu", "1", "HR:3"),
    );
    first.expect("first");
    second.expect("second");
    third.expect("third");

    assert_eq!(h.transport.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(*h.transport.completed.lock().expect("lock"), vec![1, 2, 3]);
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn reads_on_different_protocols_overlap() {
    let h = harness();
    h.manager
        .add_protocol("ahu", rtu_config("/dev/ttyUSB0", 1000, 1))
        .expect("add ahu");
    h.manager
        .add_protocol("vav", rtu_config("/dev/ttyUSB1", 1000, 1))
        .expect("add vav");
    *h.transport.read_delay.lock().expect("lock") = Duration::from_millis(100);

    let started = tokio::time::Instant::now();
    let (ahu, vav) = tokio::join!(
        h.access.read_point("ahu", "1", "HR:1"),
        h.access.read_point("vav", "1", "HR:2"),
    );
    ahu.expect("ahu");
    vav.expect("vav");

    assert_eq!(h.transport.max_in_flight.load(Ordering::SeqCst), 2);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(200), "{elapsed:?}");
}
