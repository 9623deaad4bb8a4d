#![allow(dead_code)]

use async_trait::async_trait;
use domain::{
    ChannelType, ConnectionType, Device, FieldBinding, InputType, Parity, Point, PointValue,
    ProtocolConfig, ProtocolType,
};
use fpg_control::{
    AuditTrail, ManualClock, MaintenanceInterlock, MaintenanceService, PointAccessService,
    PointCatalog,
};
use fpg_protocol::{
    ConnectionManager, FieldTransport, PointTarget, TransportError, TransportFactory,
};
use fpg_storage::{AuditLogRecord, AuditLogStore, InMemoryAuditLogStore};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 读写的预设结果
#[derive(Debug, Clone)]
pub enum Step {
    Value(PointValue),
    /// 设备报告超时
    Timeout,
    /// 不响应，直到调用方超时
    Hang,
    /// 连接断开
    Broken,
    IllegalAddress,
}

#[derive(Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub written: Mutex<Vec<PointValue>>,
    /// 每次读取的耗时（为零时立即返回）
    pub read_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    /// 读取完成顺序（Modbus 寄存器号）
    pub completed: Mutex<Vec<u16>>,
}

impl ScriptedTransport {
    pub fn script(&self, steps: impl IntoIterator<Item = Step>) {
        self.steps.lock().expect("lock").extend(steps);
    }

    /// 脚本用完后默认成功
    async fn next(&self) -> Result<Option<PointValue>, TransportError> {
        let step = self.steps.lock().expect("lock").pop_front();
        match step {
            None => Ok(None),
            Some(Step::Value(value)) => Ok(Some(value)),
            Some(Step::Timeout) => Err(TransportError::Timeout("no response".to_string())),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(None)
            }
            Some(Step::Broken) => Err(TransportError::Connection("port closed".to_string())),
            Some(Step::IllegalAddress) => {
                Err(TransportError::IllegalAddress("exception 0x02".to_string()))
            }
        }
    }
}

#[async_trait]
impl FieldTransport for ScriptedTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    async fn read(&self, target: &PointTarget) -> Result<PointValue, TransportError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.read_delay.lock().expect("lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let PointTarget::Modbus { register, .. } = target {
            self.completed.lock().expect("lock").push(*register);
        }
        Ok(self.next().await?.unwrap_or(PointValue::Int(0)))
    }

    async fn write(&self, _target: &PointTarget, value: &PointValue) -> Result<(), TransportError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.next().await?;
        self.written.lock().expect("lock").push(value.clone());
        Ok(())
    }

    async fn probe(&self, _unit: u8, _timeout: Duration) -> Result<bool, TransportError> {
        Ok(false)
    }

    async fn who_is(&self, _window: Duration) -> Result<Vec<Device>, TransportError> {
        Ok(Vec::new())
    }
}

pub struct ScriptedFactory {
    pub transport: Arc<ScriptedTransport>,
    pub creates: AtomicUsize,
}

impl TransportFactory for ScriptedFactory {
    fn create(
        &self,
        _name: &str,
        _config: &ProtocolConfig,
    ) -> Result<Arc<dyn FieldTransport>, TransportError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(self.transport.clone())
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub transport: Arc<ScriptedTransport>,
    pub factory: Arc<ScriptedFactory>,
    pub manager: Arc<ConnectionManager>,
    pub catalog: Arc<PointCatalog>,
    pub maintenance: Arc<MaintenanceService>,
    pub audit_store: Arc<InMemoryAuditLogStore>,
    pub audit: AuditTrail,
    pub access: PointAccessService,
}

impl Harness {
    pub async fn audit_records(&self) -> Vec<AuditLogRecord> {
        self.audit_store
            .list_audit_logs(None, None, 0)
            .await
            .expect("audit list")
    }
}

pub fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let transport = Arc::new(ScriptedTransport::default());
    let factory = Arc::new(ScriptedFactory {
        transport: transport.clone(),
        creates: AtomicUsize::new(0),
    });
    let manager = Arc::new(ConnectionManager::new(factory.clone()));
    let catalog = Arc::new(PointCatalog::new(manager.registry().clone()));
    let audit_store = Arc::new(InMemoryAuditLogStore::new());
    let audit = AuditTrail::new(audit_store.clone(), clock.clone());
    let maintenance = Arc::new(MaintenanceService::new(
        Arc::new(MaintenanceInterlock::new(clock.clone())),
        audit.clone(),
    ));
    let access = PointAccessService::new(
        manager.clone(),
        catalog.clone(),
        maintenance.clone(),
        audit.clone(),
    );
    Harness {
        clock,
        transport,
        factory,
        manager,
        catalog,
        maintenance,
        audit_store,
        audit,
        access,
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

pub fn point(id: &str, channel_type: ChannelType, index: u8) -> Point {
    Point {
        id: id.to_string(),
        board_id: "0".to_string(),
        channel_type,
        channel_index: index,
        name: id.to_string(),
        units: "%".to_string(),
        input_type: InputType::Voltage,
        scaling_min: 0.0,
        scaling_max: 100.0,
        calibration_offset: 0.0,
        alarm_high: None,
        alarm_low: None,
        enabled: true,
        binding: None,
    }
}

pub fn bound(mut point: Point, protocol: &str, device_id: &str, address: &str) -> Point {
    point.binding = Some(FieldBinding {
        protocol: protocol.to_string(),
        device_id: device_id.to_string(),
        address: address.to_string(),
    });
    point
}
