use domain::{
    ChannelType, ConnectionType, InputType, NamedProtocol, Parity, Point, ProtocolConfig,
    ProtocolType,
};
use fpg_storage::{
    GatewaySnapshot, InMemorySnapshotStore, JsonFileSnapshotStore, RawSnapshot, SnapshotStore,
};

fn sample_snapshot() -> GatewaySnapshot {
    let protocol = NamedProtocol {
        name: "chw-meter".to_string(),
        config: ProtocolConfig {
            protocol_type: ProtocolType::ModbusRtu,
            connection: ConnectionType::Serial {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 9600,
                data_bits: 8,
                stop_bits: 1,
                parity: Parity::None,
            },
            timeout_ms: 3000,
            retry_count: 3,
            enabled: true,
            station_address: None,
        },
    };
    let point = Point {
        id: "ao-1".to_string(),
        board_id: "0".to_string(),
        channel_type: ChannelType::AnalogOutput,
        channel_index: 1,
        name: "valve".to_string(),
        units: "%".to_string(),
        input_type: InputType::Voltage,
        scaling_min: 0.0,
        scaling_max: 100.0,
        calibration_offset: 0.0,
        alarm_high: None,
        alarm_low: None,
        enabled: true,
        binding: None,
    };
    GatewaySnapshot::new(vec![protocol], vec![point])
}

fn temp_path(name: &str) -> std::path::PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    std::env::temp_dir()
        .join(format!("fpg-storage-{}-{}", std::process::id(), nanos))
        .join(name)
}

#[tokio::test]
async fn in_memory_snapshot_save_and_load() {
    let store = InMemorySnapshotStore::new();
    assert!(store.load().await.expect("load").is_none());

    let snapshot = sample_snapshot();
    store.save(&snapshot).await.expect("save");
    assert_eq!(
        store.load().await.expect("load"),
        Some(snapshot.to_raw().expect("raw"))
    );
}

#[tokio::test]
async fn json_file_snapshot_persists() {
    let path = temp_path("gateway.json");
    let store = JsonFileSnapshotStore::new(&path);
    assert!(store.load().await.expect("missing file").is_none());

    let snapshot = sample_snapshot();
    store.save(&snapshot).await.expect("save");

    let reopened = JsonFileSnapshotStore::new(&path);
    let loaded = reopened.load().await.expect("load").expect("snapshot");
    assert_eq!(loaded, snapshot.to_raw().expect("raw"));
    assert_eq!(loaded.points[0]["input_type"], "voltage");

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[tokio::test]
async fn json_file_rejects_garbage() {
    let path = temp_path("broken.json");
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).expect("dir");
    }
    std::fs::write(&path, "{ not json").expect("write");

    let store = JsonFileSnapshotStore::new(&path);
    let err = store.load().await.expect_err("garbage");
    assert!(err.to_string().starts_with("json:"));

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[test]
fn snapshot_json_defaults_missing_sections() {
    let snapshot = RawSnapshot::parse("{}").expect("decode");
    assert_eq!(snapshot, RawSnapshot::default());
}

#[test]
fn unreadable_point_does_not_fail_the_snapshot() {
    let snapshot = RawSnapshot::parse(
        r#"{"protocols": [], "points": [{"id": "ui-1", "input_type": "pressure"}, {"id": "ui-2"}]}"#,
    )
    .expect("decode");
    assert_eq!(snapshot.points.len(), 2);
    assert_eq!(snapshot.points[0]["input_type"], "pressure");
}
