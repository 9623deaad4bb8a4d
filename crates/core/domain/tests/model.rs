use domain::{
    CallerContext, ChannelType, ConfigError, ConnectionType, GatewayError, InputType, Point,
    PointRef, PointValue, ProtocolConfig, ProtocolType,
};

fn ui_point() -> Point {
    Point {
        id: "ui-1".to_string(),
        board_id: "0".to_string(),
        channel_type: ChannelType::UniversalInput,
        channel_index: 1,
        name: "supply air".to_string(),
        units: "°C".to_string(),
        input_type: InputType::Voltage,
        scaling_min: 0.0,
        scaling_max: 100.0,
        calibration_offset: 0.0,
        alarm_high: Some(80.0),
        alarm_low: Some(5.0),
        enabled: true,
        binding: None,
    }
}

#[test]
fn point_value_serializes_tagged() {
    let json = serde_json::to_value(PointValue::Float(72.5)).expect("json");
    assert_eq!(json["type"], "Float");
    assert_eq!(json["value"], 72.5);

    let back: PointValue =
        serde_json::from_str(r#"{"type":"Bool","value":true}"#).expect("decode");
    assert_eq!(back, PointValue::Bool(true));
}

#[test]
fn caller_context_is_explicit() {
    let ctx: CallerContext =
        serde_json::from_str(r#"{"context":"manual","operator":"tech-7"}"#).expect("decode");
    assert!(!ctx.is_automatic());
    assert_eq!(ctx.actor(), "tech-7");
    assert!(CallerContext::automatic("bms").is_automatic());
}

#[test]
fn point_validation_rejects_bad_channels() {
    assert!(ui_point().validate().is_ok());

    let mut point = ui_point();
    point.channel_index = 9;
    assert!(matches!(
        point.validate(),
        Err(ConfigError::InvalidChannel { .. })
    ));

    let mut point = ui_point();
    point.scaling_max = point.scaling_min;
    assert!(point.validate().is_err());

    let mut point = ui_point();
    point.alarm_low = Some(90.0);
    assert!(point.validate().is_err());

    let mut point = ui_point();
    point.channel_type = ChannelType::Relay;
    point.channel_index = 16;
    assert!(point.validate().is_ok());
}

#[test]
fn unknown_input_type_fails_at_parse() {
    assert_eq!("4-20mA".parse::<InputType>(), Ok(InputType::Current));
    assert_eq!(
        "pressure".parse::<InputType>(),
        Err(ConfigError::UnknownInputType("pressure".to_string()))
    );

    // JSON 走同一套解析：别名可用，未知取值报 UnknownInputType
    let parsed: InputType = serde_json::from_str(r#""thermistor""#).expect("alias");
    assert_eq!(parsed, InputType::Resistance);
    assert_eq!(
        serde_json::to_value(InputType::Resistance).expect("encode"),
        "resistance"
    );
    let err = serde_json::from_str::<InputType>(r#""pressure""#).expect_err("unknown");
    assert!(err.to_string().contains("unknown input type: pressure"), "{err}");
}

#[test]
fn protocol_config_defaults() {
    let config: ProtocolConfig = serde_json::from_str(
        r#"{
            "protocol_type": "ModbusRtu",
            "connection": {"Serial": {"port": "/dev/ttyUSB0", "baud_rate": 9600}},
            "timeout_ms": 3000,
            "retry_count": 0
        }"#,
    )
    .expect("decode");
    assert!(config.enabled);
    assert_eq!(config.attempts(), 1);
    assert!(config.protocol_type.is_serial());
    assert_eq!(config.connection.serial_port(), Some("/dev/ttyUSB0"));
    match config.connection {
        ConnectionType::Serial {
            data_bits,
            stop_bits,
            ..
        } => {
            assert_eq!(data_bits, 8);
            assert_eq!(stop_bits, 1);
        }
        ConnectionType::Network { .. } => panic!("expected serial"),
    }
    assert_eq!(ProtocolType::BacnetIp.to_string(), "bacnet_ip");
}

#[test]
fn error_codes_and_retry_classes() {
    let point = PointRef::new("chw-meter", "1", "HR:100");
    let timeout = GatewayError::Timeout {
        point: point.clone(),
        timeout_ms: 3000,
    };
    assert!(timeout.is_retryable());
    assert_eq!(timeout.code(), "FIELD.TIMEOUT");
    assert!(timeout.to_string().contains("chw-meter/1/HR:100"));

    let locked = GatewayError::MaintenanceLocked {
        point: point.to_string(),
    };
    assert!(!locked.is_retryable());
    assert_eq!(locked.code(), "POLICY.MAINTENANCE_LOCKED");

    let config: GatewayError = ConfigError::DuplicateName("a".to_string()).into();
    assert_eq!(config.code(), "CONFIG.DUPLICATE_NAME");
    assert!(!config.is_retryable());
}
