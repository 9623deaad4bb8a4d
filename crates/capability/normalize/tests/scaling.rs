use domain::{ChannelType, ConfigError, GatewayError, InputType, Point, PointValue};
use fpg_normalize::{
    AlarmState, NormalizeError, ScalingEngine, SteinhartHart, evaluate_alarm,
};
use std::sync::Arc;

fn point(input_type: InputType, min: f64, max: f64, offset: f64) -> Point {
    Point {
        id: "p".to_string(),
        board_id: "0".to_string(),
        channel_type: ChannelType::UniversalInput,
        channel_index: 1,
        name: "test".to_string(),
        units: "°C".to_string(),
        input_type,
        scaling_min: min,
        scaling_max: max,
        calibration_offset: offset,
        alarm_high: Some(90.0),
        alarm_low: Some(10.0),
        enabled: true,
        binding: None,
    }
}

fn float(value: PointValue) -> f64 {
    match value {
        PointValue::Float(value) => value,
        other => panic!("expected float, got {other:?}"),
    }
}

#[test]
fn voltage_and_current_round_trip() {
    let engine = ScalingEngine::new();
    let cases = [
        (InputType::Voltage, 0.0, 10.0),
        (InputType::Current, 4.0, 20.0),
    ];
    for (input_type, low, high) in cases {
        let point = point(input_type, -40.0, 250.0, 1.25);
        let mut raw = low;
        while raw <= high {
            let engineering = engine.to_engineering(raw, &point).expect("engineering");
            let back = engine.to_raw(&engineering, &point).expect("raw");
            assert!((back - raw).abs() < 1e-6, "{input_type:?} raw {raw} -> {back}");
            raw += 0.37;
        }
    }
}

#[test]
fn voltage_formula() {
    let engine = ScalingEngine::new();
    let point = point(InputType::Voltage, 0.0, 100.0, 0.5);
    assert!((float(engine.to_engineering(5.0, &point).expect("v")) - 50.5).abs() < 1e-9);

    let current = self::point(InputType::Current, 0.0, 100.0, 0.0);
    assert!((float(engine.to_engineering(12.0, &current).expect("c")) - 50.0).abs() < 1e-9);
}

#[test]
fn values_outside_domain_are_not_clamped() {
    let engine = ScalingEngine::new();
    let point = point(InputType::Voltage, 0.0, 100.0, 0.0);
    assert!((float(engine.to_engineering(12.0, &point).expect("v")) - 120.0).abs() < 1e-9);
}

#[test]
fn digital_threshold() {
    let engine = ScalingEngine::new();
    let point = point(InputType::Digital, 0.0, 1.0, 0.0);
    assert_eq!(engine.to_engineering(5.0, &point), Ok(PointValue::Bool(false)));
    assert_eq!(engine.to_engineering(5.01, &point), Ok(PointValue::Bool(true)));
}

#[test]
fn resistance_requires_converter() {
    let point = point(InputType::Resistance, 0.0, 1.0, 0.0);
    let err = ScalingEngine::new()
        .to_engineering(10_000.0, &point)
        .expect_err("no converter");
    assert!(matches!(
        err,
        NormalizeError::Config(ConfigError::InvalidChannel { .. })
    ));

    let engine = ScalingEngine::with_converter(Arc::new(SteinhartHart::ntc_10k_type2()));
    let celsius = float(engine.to_engineering(10_000.0, &point).expect("celsius"));
    assert!((celsius - 25.0).abs() < 0.1);

    let mut fahrenheit = point.clone();
    fahrenheit.units = "°F".to_string();
    let value = float(engine.to_engineering(10_000.0, &fahrenheit).expect("fahrenheit"));
    assert!((value - 77.0).abs() < 0.2);
}

#[test]
fn equal_span_is_config_error() {
    let point = point(InputType::Voltage, 5.0, 5.0, 0.0);
    let err = ScalingEngine::new().to_engineering(1.0, &point).expect_err("span");
    assert_eq!(GatewayError::from(err).code(), "CONFIG.INVALID_CHANNEL");
}

#[test]
fn string_write_to_analog_output_is_invalid_input() {
    let mut point = point(InputType::Voltage, 0.0, 100.0, 0.0);
    point.channel_type = ChannelType::AnalogOutput;
    let err = ScalingEngine::new()
        .to_raw(&PointValue::String("on".to_string()), &point)
        .expect_err("string");
    assert_eq!(GatewayError::from(err).code(), "INVALID.REQUEST");
}

#[test]
fn relay_and_triac_channels() {
    let engine = ScalingEngine::new();
    let mut relay = point(InputType::Voltage, 0.0, 1.0, 0.0);
    relay.channel_type = ChannelType::Relay;
    assert_eq!(engine.to_engineering(1.0, &relay), Ok(PointValue::Bool(true)));
    assert_eq!(engine.to_raw(&PointValue::Bool(false), &relay), Ok(0.0));

    let mut triac = relay.clone();
    triac.channel_type = ChannelType::Triac;
    assert_eq!(engine.to_engineering(42.0, &triac), Ok(PointValue::Float(42.0)));
    assert_eq!(engine.to_raw(&PointValue::Int(75), &triac), Ok(75.0));
}

#[test]
fn alarm_limits() {
    let point = point(InputType::Voltage, 0.0, 100.0, 0.0);
    assert_eq!(evaluate_alarm(&PointValue::Float(95.0), &point), Some(AlarmState::High));
    assert_eq!(evaluate_alarm(&PointValue::Int(3), &point), Some(AlarmState::Low));
    assert_eq!(evaluate_alarm(&PointValue::Float(50.0), &point), None);
    assert_eq!(evaluate_alarm(&PointValue::Bool(true), &point), None);
}
