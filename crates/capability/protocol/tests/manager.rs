mod common;

use common::{rtu_config, MockFactory, MockTransport};
use domain::{ConfigError, ConnectionState, GatewayError, NamedProtocol};
use fpg_protocol::{ConnectPolicy, ConnectionManager, SerialPortLister, TransportError};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn manager_with(transport: Arc<MockTransport>) -> (ConnectionManager, Arc<MockFactory>) {
    let factory = MockFactory::new(transport);
    (ConnectionManager::new(factory.clone()), factory)
}

#[tokio::test]
async fn serial_port_exclusive_until_owner_disabled() {
    let (manager, _) = manager_with(MockTransport::with_present([]));
    manager
        .add_protocol("chw-meter", rtu_config("/dev/ttyUSB0", 3000, 3))
        .expect("first owner");

    let err = manager
        .add_protocol("boiler", rtu_config("/dev/ttyUSB0", 3000, 3))
        .expect_err("port owned");
    assert_eq!(
        err,
        GatewayError::Config(ConfigError::PortInUse {
            port: "/dev/ttyUSB0".to_string(),
            owner: "chw-meter".to_string(),
        })
    );

    manager.disable_protocol("chw-meter").await.expect("disable");
    manager
        .add_protocol("boiler", rtu_config("/dev/ttyUSB0", 3000, 3))
        .expect("port released");

    let err = manager
        .enable_protocol("chw-meter")
        .await
        .expect_err("boiler owns port now");
    assert_eq!(err.code(), "CONFIG.PORT_IN_USE");
}

#[tokio::test]
async fn duplicate_name_rejected() {
    let (manager, _) = manager_with(MockTransport::with_present([]));
    manager
        .add_protocol("chw-meter", rtu_config("/dev/ttyUSB0", 3000, 3))
        .expect("add");
    let err = manager
        .add_protocol("chw-meter", rtu_config("/dev/ttyUSB1", 3000, 3))
        .expect_err("duplicate");
    assert_eq!(err.code(), "CONFIG.DUPLICATE_NAME");
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_requires_reenable() {
    let transport = MockTransport::with_present([]);
    transport.connect_failures.store(10, Ordering::SeqCst);
    let (manager, _) = manager_with(transport.clone());
    manager
        .add_protocol("chw-meter", rtu_config("/dev/ttyUSB0", 1000, 3))
        .expect("add");

    let started = tokio::time::Instant::now();
    let err = manager.connect("chw-meter").await.expect_err("never connects");
    assert_eq!(err.code(), "FIELD.CONNECTION");
    assert_eq!(transport.connects.load(Ordering::SeqCst), 3);
    // 两次退避：1000ms + 2000ms
    assert_eq!(started.elapsed().as_millis(), 3000);

    let status = manager.status("chw-meter").expect("status");
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert!(status.exhausted);
    assert_eq!(status.attempts, 3);
    assert!(status.last_error.is_some());

    let err = manager.connect("chw-meter").await.expect_err("exhausted");
    assert_eq!(err, GatewayError::NotConnected("chw-meter".to_string()));
    assert_eq!(transport.connects.load(Ordering::SeqCst), 3);

    transport.connect_failures.store(0, Ordering::SeqCst);
    manager.enable_protocol("chw-meter").await.expect("re-enable");
    manager.connect("chw-meter").await.expect("connects");
    let status = manager.status("chw-meter").expect("status");
    assert_eq!(status.state, ConnectionState::Connected);
    assert!(!status.exhausted);
}

#[tokio::test(start_paused = true)]
async fn recovers_within_budget() {
    let transport = MockTransport::with_present([]);
    transport.connect_failures.store(1, Ordering::SeqCst);
    let (manager, factory) = manager_with(transport.clone());
    manager
        .add_protocol("chw-meter", rtu_config("/dev/ttyUSB0", 500, 3))
        .expect("add");

    manager.connect("chw-meter").await.expect("second attempt connects");
    assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
    assert_eq!(factory.creates.load(Ordering::SeqCst), 2);
    let status = manager.status("chw-meter").expect("status");
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.attempts, 0);
}

#[tokio::test]
async fn transport_failure_drops_connection() {
    let transport = MockTransport::with_present([]);
    let (manager, _) = manager_with(transport.clone());
    manager
        .add_protocol("chw-meter", rtu_config("/dev/ttyUSB0", 500, 3))
        .expect("add");
    manager.connect("chw-meter").await.expect("connect");

    let mut lease = manager
        .acquire("chw-meter", ConnectPolicy::Lazy)
        .await
        .expect("lease");
    let err = TransportError::Connection("cable unplugged".to_string()).into_gateway("chw-meter");
    lease.record_failure(&err).await;
    drop(lease);

    let status = manager.status("chw-meter").expect("status");
    assert_eq!(status.state, ConnectionState::Error);
    assert_eq!(transport.closes.load(Ordering::SeqCst), 1);

    // 下一次调用重新建立连接
    let mut lease = manager
        .acquire("chw-meter", ConnectPolicy::Lazy)
        .await
        .expect("lease");
    lease.ensure_connected().await.expect("reconnect");
    assert_eq!(lease.status().state, ConnectionState::Connected);
}

#[tokio::test]
async fn unknown_and_disabled_protocols() {
    let (manager, _) = manager_with(MockTransport::with_present([]));
    let err = manager
        .acquire("missing", ConnectPolicy::Lazy)
        .await
        .err()
        .expect("unknown");
    assert_eq!(err.code(), "RESOURCE.NOT_FOUND");

    let mut config = rtu_config("/dev/ttyUSB0", 500, 1);
    config.enabled = false;
    manager.add_protocol("idle", config).expect("add");
    let err = manager
        .acquire("idle", ConnectPolicy::Lazy)
        .await
        .err()
        .expect("disabled");
    assert_eq!(err.code(), "POLICY.DISABLED");
}

#[tokio::test]
async fn remove_closes_connection_and_forgets_devices() {
    let transport = MockTransport::with_present([]);
    let (manager, _) = manager_with(transport.clone());
    manager
        .add_protocol("chw-meter", rtu_config("/dev/ttyUSB0", 500, 1))
        .expect("add");
    manager.connect("chw-meter").await.expect("connect");

    manager.remove_protocol("chw-meter").await.expect("remove");
    assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    assert!(manager.status("chw-meter").is_err());
    assert!(manager.devices("chw-meter").is_err());
    assert!(manager.list_protocols().is_empty());

    // 串口随之释放
    manager
        .add_protocol("boiler", rtu_config("/dev/ttyUSB0", 500, 1))
        .expect("port free");
    assert_eq!(
        manager.remove_protocol("missing").await.expect_err("absent").code(),
        "RESOURCE.NOT_FOUND"
    );
}

#[tokio::test]
async fn list_reports_runtime_state() {
    let (manager, _) = manager_with(MockTransport::with_present([]));
    manager
        .add_protocol("b-meter", rtu_config("/dev/ttyUSB1", 500, 1))
        .expect("add");
    manager
        .add_protocol("a-meter", rtu_config("/dev/ttyUSB0", 500, 1))
        .expect("add");
    manager.connect("b-meter").await.expect("connect");

    let summaries = manager.list_protocols();
    let names: Vec<&str> = summaries.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names, vec!["a-meter", "b-meter"]);
    assert_eq!(summaries[0].state, ConnectionState::Disconnected);
    assert_eq!(summaries[1].state, ConnectionState::Connected);
    assert_eq!(summaries[1].device_count, 0);
}

#[tokio::test]
async fn export_then_import_revalidates() {
    let (source, _) = manager_with(MockTransport::with_present([]));
    source
        .add_protocol("chw-meter", rtu_config("/dev/ttyUSB0", 3000, 3))
        .expect("add");
    source
        .add_protocol("ahu", rtu_config("/dev/ttyUSB1", 3000, 3))
        .expect("add");
    let exported = source.export_protocols();
    assert_eq!(exported.len(), 2);

    let (target, _) = manager_with(MockTransport::with_present([]));
    target
        .add_protocol("ahu", rtu_config("/dev/ttyUSB2", 3000, 3))
        .expect("pre-existing");
    let rejected: Vec<(NamedProtocol, GatewayError)> = target.import_protocols(exported);
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].0.name, "ahu");
    assert_eq!(rejected[0].1.code(), "CONFIG.DUPLICATE_NAME");
    assert_eq!(target.list_protocols().len(), 2);
}

struct FixedPorts;

impl SerialPortLister for FixedPorts {
    fn available_ports(&self) -> Result<Vec<String>, TransportError> {
        Ok(vec!["/dev/ttyAMA0".to_string(), "/dev/ttyUSB0".to_string()])
    }
}

#[test]
fn serial_ports_come_from_lister() {
    let manager = ConnectionManager::new(MockFactory::new(MockTransport::with_present([])))
        .with_serial_ports(Arc::new(FixedPorts));
    assert_eq!(
        manager.get_available_serial_ports().expect("ports"),
        vec!["/dev/ttyAMA0".to_string(), "/dev/ttyUSB0".to_string()]
    );
}
