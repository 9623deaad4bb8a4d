mod common;

use common::{harness, point};
use domain::{CallerContext, ChannelType, GatewayError, InputType, PointValue};
use fpg_control::{HardwareDriver, LocalPointService, SimulatedDriver};
use fpg_normalize::{AlarmState, Rtd, ScalingEngine};
use std::sync::Arc;

fn service(h: &common::Harness, driver: Arc<SimulatedDriver>) -> LocalPointService {
    LocalPointService::new(
        h.catalog.clone(),
        driver,
        ScalingEngine::with_converter(Arc::new(Rtd::pt1000())),
        h.maintenance.clone(),
        h.audit.clone(),
    )
}

#[tokio::test]
async fn reads_scale_and_flag_alarms() {
    let h = harness();
    let driver = Arc::new(SimulatedDriver::new());
    let local = service(&h, driver.clone());

    let mut humidity = point("ra-humidity", ChannelType::UniversalInput, 2);
    humidity.alarm_high = Some(70.0);
    h.catalog.upsert_point(humidity).expect("point");
    driver.set_raw("0", ChannelType::UniversalInput, 2, 7.5);

    let reading = local.read_local("ra-humidity").await.expect("read");
    assert_eq!(reading.raw, 7.5);
    assert_eq!(reading.value, PointValue::Float(75.0));
    assert_eq!(reading.alarm, Some(AlarmState::High));
}

#[tokio::test]
async fn resistance_inputs_use_the_converter() {
    let h = harness();
    let driver = Arc::new(SimulatedDriver::new());
    let local = service(&h, driver.clone());

    let mut sat = point("sat", ChannelType::UniversalInput, 1);
    sat.input_type = InputType::Resistance;
    sat.units = "°C".to_string();
    h.catalog.upsert_point(sat).expect("point");
    driver.set_raw("0", ChannelType::UniversalInput, 1, 1000.0);

    let reading = local.read_local("sat").await.expect("read");
    match reading.value {
        PointValue::Float(celsius) => assert!(celsius.abs() < 1e-6),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn writes_go_through_scaling() {
    let h = harness();
    let driver = Arc::new(SimulatedDriver::new());
    let local = service(&h, driver.clone());
    h.catalog
        .upsert_point(point("chw-valve", ChannelType::AnalogOutput, 1))
        .expect("point");

    let raw = local
        .write_local(
            "chw-valve",
            PointValue::Float(40.0),
            &CallerContext::automatic("pid"),
        )
        .await
        .expect("write");
    assert!((raw - 4.0).abs() < 1e-9);
    let stored = driver
        .read_raw("0", ChannelType::AnalogOutput, 1)
        .await
        .expect("raw");
    assert!((stored - 4.0).abs() < 1e-9);

    let records = h.audit_records().await;
    assert_eq!(records[0].action, "POINT.LOCAL.WRITE");
    assert_eq!(records[0].resource, "local/chw-valve");
    assert_eq!(records[0].result, "ok");
}

#[tokio::test]
async fn inputs_are_not_writable_and_disabled_points_refuse() {
    let h = harness();
    let local = service(&h, Arc::new(SimulatedDriver::new()));
    h.catalog
        .upsert_point(point("oat", ChannelType::UniversalInput, 3))
        .expect("point");

    let err = local
        .write_local("oat", PointValue::Float(1.0), &CallerContext::manual("op"))
        .await
        .expect_err("input");
    assert!(matches!(err, GatewayError::InvalidInput(_)));

    h.catalog.set_point_enabled("oat", false).expect("disable");
    let err = local.read_local("oat").await.expect_err("disabled");
    assert!(matches!(err, GatewayError::Disabled(_)));

    let err = local.read_local("missing").await.expect_err("missing");
    assert!(matches!(err, GatewayError::NotFound(_)));
}

#[tokio::test]
async fn automatic_local_write_blocked_by_maintenance() {
    let h = harness();
    let driver = Arc::new(SimulatedDriver::new());
    let local = service(&h, driver.clone());
    h.catalog
        .upsert_point(point("fan-enable", ChannelType::Relay, 4))
        .expect("point");
    h.maintenance
        .enable_maintenance_mode("fan bearing", "tech", 20)
        .await
        .expect("enable");

    let err = local
        .write_local(
            "fan-enable",
            PointValue::Bool(true),
            &CallerContext::automatic("schedule"),
        )
        .await
        .expect_err("locked");
    assert!(matches!(err, GatewayError::MaintenanceLocked { .. }));
    assert_eq!(
        driver
            .read_raw("0", ChannelType::Relay, 4)
            .await
            .expect("raw"),
        0.0
    );

    let raw = local
        .write_local(
            "fan-enable",
            PointValue::Bool(true),
            &CallerContext::manual("tech"),
        )
        .await
        .expect("manual");
    assert_eq!(raw, 1.0);
}
