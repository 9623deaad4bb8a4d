#![allow(dead_code)]

use async_trait::async_trait;
use domain::{ConnectionType, Device, Parity, PointValue, ProtocolConfig, ProtocolType};
use fpg_protocol::{FieldTransport, PointTarget, TransportError, TransportFactory};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 可编程的传输桩
#[derive(Default)]
pub struct MockTransport {
    pub connect_failures: AtomicU32,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub present: Mutex<BTreeSet<u8>>,
    /// 探测该站号时返回传输错误
    pub fail_probe_at: Mutex<Option<u8>>,
    /// 探测耗时（为零时立即返回）
    pub probe_delay: Mutex<Duration>,
    pub probes: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub who_is_devices: Mutex<Vec<Device>>,
}

impl MockTransport {
    pub fn with_present(units: impl IntoIterator<Item = u8>) -> Arc<Self> {
        let mock = Self::default();
        *mock.present.lock().expect("lock") = units.into_iter().collect();
        Arc::new(mock)
    }

    pub fn set_present(&self, units: impl IntoIterator<Item = u8>) {
        *self.present.lock().expect("lock") = units.into_iter().collect();
    }
}

#[async_trait]
impl FieldTransport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let remaining = self.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.connect_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Connection("port busy".to_string()));
        }
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    async fn read(&self, _target: &PointTarget) -> Result<PointValue, TransportError> {
        Ok(PointValue::Int(0))
    }

    async fn write(&self, _target: &PointTarget, _value: &PointValue) -> Result<(), TransportError> {
        Ok(())
    }

    async fn probe(&self, unit: u8, _timeout: Duration) -> Result<bool, TransportError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.probe_delay.lock().expect("lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if *self.fail_probe_at.lock().expect("lock") == Some(unit) {
            return Err(TransportError::Connection("bus fault".to_string()));
        }
        Ok(self.present.lock().expect("lock").contains(&unit))
    }

    async fn who_is(&self, _window: Duration) -> Result<Vec<Device>, TransportError> {
        Ok(self.who_is_devices.lock().expect("lock").clone())
    }
}

/// 每次创建都返回同一个桩
pub struct MockFactory {
    pub transport: Arc<MockTransport>,
    pub creates: AtomicUsize,
}

impl MockFactory {
    pub fn new(transport: Arc<MockTransport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            creates: AtomicUsize::new(0),
        })
    }
}

impl TransportFactory for MockFactory {
    fn create(
        &self,
        _name: &str,
        _config: &ProtocolConfig,
    ) -> Result<Arc<dyn FieldTransport>, TransportError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(self.transport.clone())
    }
}

pub fn rtu_config(port: &str, timeout_ms: u64, retry_count: u8) -> ProtocolConfig {
    ProtocolConfig {
        protocol_type: ProtocolType::ModbusRtu,
        connection: ConnectionType::Serial {
            port: port.to_string(),
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
        },
        timeout_ms,
        retry_count,
        enabled: true,
        station_address: None,
    }
}

pub fn bacnet_ip_config(timeout_ms: u64) -> ProtocolConfig {
    ProtocolConfig {
        protocol_type: ProtocolType::BacnetIp,
        connection: ConnectionType::Network {
            ip_address: "0.0.0.0".to_string(),
            port: 47808,
            interface: None,
        },
        timeout_ms,
        retry_count: 1,
        enabled: true,
        station_address: None,
    }
}
