//! 连接管理器
//!
//! 每个协议一个槽位：
//! - `io`：FIFO 异步锁，串行化该协议上的所有 I/O（读写、发现、连接）
//! - `status`：连接状态机快照，读取不需要排队
//!
//! 状态机：
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected
//! Connected --I/O 失败--> Error --退避--> Connecting
//! Error --尝试次数用尽--> Disconnected（需重新启用）
//! ```

use crate::error::TransportError;
use crate::registry::{DeviceListEvent, ProtocolRegistry};
use crate::serial::{SerialPortLister, SystemSerialPorts};
use crate::transport::{FieldTransport, TransportFactory};
use domain::{ConnectionState, Device, GatewayError, NamedProtocol, ProtocolConfig};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 退避上限倍数
const MAX_BACKOFF_FACTOR: u64 = 8;

/// 获取连接时的策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPolicy {
    /// 未连接时在租约内按状态机建立连接（点位读写）
    Lazy,
    /// 必须已连接，否则立即返回 `NotConnected`（设备发现）
    RequireConnected,
}

/// 连接运行时状态。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub last_error: Option<String>,
    /// 连续失败的连接尝试次数
    pub attempts: u32,
    /// 尝试次数用尽，需重新启用
    pub exhausted: bool,
}

/// `list_protocols` 的条目。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolSummary {
    pub name: String,
    pub config: ProtocolConfig,
    pub state: ConnectionState,
    pub last_error: Option<String>,
    pub device_count: usize,
    pub exhausted: bool,
}

/// 调用选项：取消与截止时间，只在两次尝试之间检查。
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub cancel: Option<CancellationToken>,
    pub deadline: Option<tokio::time::Instant>,
}

impl CallOptions {
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel: Some(cancel),
            deadline: None,
        }
    }

    pub fn with_deadline(deadline: tokio::time::Instant) -> Self {
        Self {
            cancel: None,
            deadline: Some(deadline),
        }
    }

    /// 已取消或已过截止时间时返回 `Cancelled`。
    pub fn check(&self) -> Result<(), GatewayError> {
        if self
            .cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(GatewayError::Cancelled);
        }
        if self
            .deadline
            .is_some_and(|deadline| tokio::time::Instant::now() >= deadline)
        {
            return Err(GatewayError::Cancelled);
        }
        Ok(())
    }
}

struct SlotIo {
    transport: Option<Arc<dyn FieldTransport>>,
}

struct ProtocolSlot {
    io: Arc<Mutex<SlotIo>>,
    status: RwLock<ConnectionStatus>,
}

impl ProtocolSlot {
    fn new() -> Self {
        Self {
            io: Arc::new(Mutex::new(SlotIo { transport: None })),
            status: RwLock::new(ConnectionStatus::default()),
        }
    }

    fn status(&self) -> ConnectionStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, apply: impl FnOnce(&mut ConnectionStatus)) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut status);
    }
}

/// 第 n 次重连前的退避：`timeout_ms * 2^(n-1)`，上限 8 倍。
pub fn backoff(timeout_ms: u64, attempts: u32) -> Duration {
    let factor = 1u64
        .checked_shl(attempts.saturating_sub(1))
        .unwrap_or(u64::MAX)
        .min(MAX_BACKOFF_FACTOR);
    Duration::from_millis(timeout_ms.saturating_mul(factor))
}

pub struct ConnectionManager {
    registry: Arc<ProtocolRegistry>,
    factory: Arc<dyn TransportFactory>,
    serial_ports: Arc<dyn SerialPortLister>,
    slots: RwLock<HashMap<String, Arc<ProtocolSlot>>>,
}

impl ConnectionManager {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            registry: Arc::new(ProtocolRegistry::new()),
            factory,
            serial_ports: Arc::new(SystemSerialPorts),
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// 替换串口枚举（测试或无串口的主机）。
    pub fn with_serial_ports(mut self, serial_ports: Arc<dyn SerialPortLister>) -> Self {
        self.serial_ports = serial_ports;
        self
    }

    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        &self.registry
    }

    fn slot(&self, name: &str) -> Arc<ProtocolSlot> {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return slot.clone();
        }
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ProtocolSlot::new()))
            .clone()
    }

    fn existing_slot(&self, name: &str) -> Option<Arc<ProtocolSlot>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn add_protocol(&self, name: &str, config: ProtocolConfig) -> Result<(), GatewayError> {
        let protocol_type = config.protocol_type;
        self.registry.add(name, config)?;
        info!(target: "fpg.protocol", protocol = %name, %protocol_type, "protocol_added");
        Ok(())
    }

    /// 关闭连接、释放串口并删除配置与设备。
    pub async fn remove_protocol(&self, name: &str) -> Result<(), GatewayError> {
        self.registry.remove(name)?;
        let slot = self
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        if let Some(slot) = slot {
            close_slot(&slot).await;
        }
        info!(target: "fpg.protocol", protocol = %name, "protocol_removed");
        Ok(())
    }

    /// 启用协议：检查串口归属并清空已用尽的重试预算。
    pub async fn enable_protocol(&self, name: &str) -> Result<(), GatewayError> {
        self.registry.set_enabled(name, true)?;
        if let Some(slot) = self.existing_slot(name) {
            slot.update(|status| {
                status.attempts = 0;
                status.exhausted = false;
            });
        }
        info!(target: "fpg.protocol", protocol = %name, "protocol_enabled");
        Ok(())
    }

    /// 禁用协议：连接强制回到 Disconnected 并释放串口。
    pub async fn disable_protocol(&self, name: &str) -> Result<(), GatewayError> {
        self.registry.set_enabled(name, false)?;
        if let Some(slot) = self.existing_slot(name) {
            close_slot(&slot).await;
        }
        info!(target: "fpg.protocol", protocol = %name, "protocol_disabled");
        Ok(())
    }

    pub fn list_protocols(&self) -> Vec<ProtocolSummary> {
        self.registry
            .list()
            .into_iter()
            .map(|named| {
                let status = self
                    .existing_slot(&named.name)
                    .map(|slot| slot.status())
                    .unwrap_or_default();
                ProtocolSummary {
                    device_count: self.registry.device_count(&named.name),
                    name: named.name,
                    config: named.config,
                    state: status.state,
                    last_error: status.last_error,
                    exhausted: status.exhausted,
                }
            })
            .collect()
    }

    pub fn status(&self, name: &str) -> Result<ConnectionStatus, GatewayError> {
        self.registry.get(name)?;
        Ok(self
            .existing_slot(name)
            .map(|slot| slot.status())
            .unwrap_or_default())
    }

    /// 显式连接：按状态机尝试直到成功或预算用尽。
    pub async fn connect(&self, name: &str) -> Result<(), GatewayError> {
        let mut lease = self.acquire(name, ConnectPolicy::Lazy).await?;
        loop {
            match lease.ensure_connected().await {
                Ok(_) => return Ok(()),
                Err(err) => {
                    if lease.status().exhausted || !err.is_retryable() {
                        return Err(err);
                    }
                }
            }
        }
    }

    /// 排队获取协议的 I/O 租约。
    pub async fn acquire(
        &self,
        name: &str,
        policy: ConnectPolicy,
    ) -> Result<ConnectionLease, GatewayError> {
        self.usable_config(name)?;
        let slot = self.slot(name);
        if policy == ConnectPolicy::RequireConnected
            && slot.status().state != ConnectionState::Connected
        {
            return Err(GatewayError::NotConnected(name.to_string()));
        }

        let io = slot.io.clone().lock_owned().await;

        // 排队期间配置可能已被禁用或删除
        let config = self.usable_config(name)?;
        if policy == ConnectPolicy::RequireConnected
            && (io.transport.is_none() || slot.status().state != ConnectionState::Connected)
        {
            return Err(GatewayError::NotConnected(name.to_string()));
        }

        Ok(ConnectionLease {
            name: name.to_string(),
            config,
            factory: self.factory.clone(),
            slot,
            io,
        })
    }

    fn usable_config(&self, name: &str) -> Result<ProtocolConfig, GatewayError> {
        let config = self.registry.get(name)?;
        if !config.enabled {
            return Err(GatewayError::Disabled(format!("protocol `{}`", name)));
        }
        Ok(config)
    }

    pub fn export_protocols(&self) -> Vec<NamedProtocol> {
        self.registry.list()
    }

    /// 逐条经 `add_protocol` 校验导入，返回被拒绝的条目。
    pub fn import_protocols(
        &self,
        protocols: Vec<NamedProtocol>,
    ) -> Vec<(NamedProtocol, GatewayError)> {
        let mut rejected = Vec::new();
        for named in protocols {
            if let Err(err) = self.add_protocol(&named.name, named.config.clone()) {
                warn!(target: "fpg.protocol", protocol = %named.name, error = %err, "protocol_import_rejected");
                rejected.push((named, err));
            }
        }
        rejected
    }

    pub fn get_available_serial_ports(&self) -> Result<Vec<String>, GatewayError> {
        self.serial_ports
            .available_ports()
            .map_err(|err| err.into_gateway("serial"))
    }

    pub fn devices(&self, name: &str) -> Result<BTreeSet<Device>, GatewayError> {
        self.registry.devices(name)
    }

    pub fn subscribe_devices(&self) -> broadcast::Receiver<DeviceListEvent> {
        self.registry.subscribe_devices()
    }
}

async fn close_slot(slot: &ProtocolSlot) {
    let mut io = slot.io.lock().await;
    if let Some(transport) = io.transport.take() {
        transport.close().await;
    }
    slot.update(|status| {
        status.state = ConnectionState::Disconnected;
        status.attempts = 0;
    });
}

/// 协议 I/O 租约：持有期间独占该协议的传输。
pub struct ConnectionLease {
    name: String,
    config: ProtocolConfig,
    factory: Arc<dyn TransportFactory>,
    slot: Arc<ProtocolSlot>,
    io: OwnedMutexGuard<SlotIo>,
}

impl ConnectionLease {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.slot.status()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    /// 返回已打开的传输；未连接时执行一次连接尝试（必要时先退避）。
    pub async fn ensure_connected(&mut self) -> Result<Arc<dyn FieldTransport>, GatewayError> {
        if let Some(transport) = &self.io.transport {
            return Ok(transport.clone());
        }
        let status = self.slot.status();
        if status.exhausted {
            return Err(GatewayError::NotConnected(self.name.clone()));
        }
        if status.attempts > 0 {
            tokio::time::sleep(backoff(self.config.timeout_ms, status.attempts)).await;
        }
        self.slot
            .update(|status| status.state = ConnectionState::Connecting);

        let opened = match self.factory.create(&self.name, &self.config) {
            Ok(transport) => match tokio::time::timeout(self.timeout(), transport.connect()).await
            {
                Ok(Ok(())) => Ok(transport),
                Ok(Err(err)) => Err(err),
                Err(_elapsed) => Err(TransportError::Connection(format!(
                    "connect timed out after {}ms",
                    self.config.timeout_ms
                ))),
            },
            Err(err) => Err(err),
        };

        match opened {
            Ok(transport) => {
                self.slot.update(|status| {
                    status.state = ConnectionState::Connected;
                    status.attempts = 0;
                });
                self.io.transport = Some(transport.clone());
                fpg_telemetry::record_connection_opened();
                info!(target: "fpg.protocol", protocol = %self.name, "connection_established");
                Ok(transport)
            }
            Err(err) => {
                let err = err.into_gateway(&self.name);
                let budget = self.config.attempts();
                let detail = err.to_string();
                let mut exhausted = false;
                self.slot.update(|status| {
                    status.attempts += 1;
                    status.last_error = Some(detail);
                    if status.attempts >= budget {
                        status.exhausted = true;
                        status.state = ConnectionState::Disconnected;
                        exhausted = true;
                    } else {
                        status.state = ConnectionState::Error;
                    }
                });
                fpg_telemetry::record_connection_failure();
                if exhausted {
                    warn!(target: "fpg.protocol", protocol = %self.name, error = %err, "connection_exhausted");
                } else {
                    warn!(target: "fpg.protocol", protocol = %self.name, error = %err, "connection_failed");
                }
                Err(err)
            }
        }
    }

    /// 记录一次失败；传输层失败时关闭连接，下次调用重新建立。
    pub async fn record_failure(&mut self, err: &GatewayError) {
        let detail = err.to_string();
        let broken = err.is_transport_failure();
        self.slot.update(|status| {
            status.last_error = Some(detail);
            if broken {
                status.state = ConnectionState::Error;
            }
        });
        if broken {
            if let Some(transport) = self.io.transport.take() {
                transport.close().await;
                warn!(target: "fpg.protocol", protocol = %self.name, error = %err, "connection_lost");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff(100, 1), Duration::from_millis(100));
        assert_eq!(backoff(100, 2), Duration::from_millis(200));
        assert_eq!(backoff(100, 3), Duration::from_millis(400));
        assert_eq!(backoff(100, 4), Duration::from_millis(800));
        assert_eq!(backoff(100, 10), Duration::from_millis(800));
        assert_eq!(backoff(100, 200), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn call_options_cancel_and_deadline() {
        assert!(CallOptions::default().check().is_ok());

        let token = CancellationToken::new();
        let options = CallOptions::with_cancel(token.clone());
        assert!(options.check().is_ok());
        token.cancel();
        assert_eq!(options.check(), Err(GatewayError::Cancelled));

        let past = tokio::time::Instant::now() - Duration::from_millis(1);
        assert_eq!(
            CallOptions::with_deadline(past).check(),
            Err(GatewayError::Cancelled)
        );
    }
}
