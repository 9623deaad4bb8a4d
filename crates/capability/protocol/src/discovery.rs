//! 设备发现
//!
//! - BACnet：广播 Who-Is，在 `timeout_ms` 窗口内收集 I-Am
//! - Modbus：在有界并发下探测站号 1..=max_unit，每个探测受 `timeout_ms` 约束。
//!   TCP 探测真正并发；RTU 总线半双工，探测在传输内逐个执行，
//!   整轮耗时约为 max_unit × timeout_ms，因此整轮另受 `deadline` 限制
//!
//! 每次运行（含中途失败）都用本次结果替换已保存的设备集合。

use crate::manager::{ConnectPolicy, ConnectionManager};
use crate::transport::FieldTransport;
use domain::{Device, GatewayError, PointRef};
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_MAX_UNIT: u8 = 247;
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(600);

/// 发现失败：携带失败前已找到的设备。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("discovery on `{protocol}` stopped after {} device(s): {source}", .found.len())]
pub struct DiscoveryError {
    pub protocol: String,
    pub found: BTreeSet<Device>,
    #[source]
    pub source: GatewayError,
}

impl DiscoveryError {
    fn before_run(protocol: &str, source: GatewayError) -> Self {
        Self {
            protocol: protocol.to_string(),
            found: BTreeSet::new(),
            source,
        }
    }
}

pub struct DiscoveryService {
    manager: Arc<ConnectionManager>,
    workers: usize,
    max_unit: u8,
    deadline: Duration,
}

impl DiscoveryService {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            manager,
            workers: DEFAULT_WORKERS,
            max_unit: DEFAULT_MAX_UNIT,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// 并发探测数与 Modbus 站号上限。
    pub fn with_limits(mut self, workers: usize, max_unit: u8) -> Self {
        self.workers = workers.max(1);
        self.max_unit = max_unit.clamp(1, DEFAULT_MAX_UNIT);
        self
    }

    /// Modbus 整轮探测的总时限；到期后以已找到的设备返回 `Timeout`。
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// 未连接时立即返回 `NotConnected`，不排队等待。
    pub async fn discover_devices(&self, name: &str) -> Result<BTreeSet<Device>, DiscoveryError> {
        let mut lease = self
            .manager
            .acquire(name, ConnectPolicy::RequireConnected)
            .await
            .map_err(|source| DiscoveryError::before_run(name, source))?;
        let transport = lease
            .ensure_connected()
            .await
            .map_err(|source| DiscoveryError::before_run(name, source))?;
        let timeout = lease.timeout();
        let protocol_type = lease.config().protocol_type;
        info!(target: "fpg.protocol", protocol = %name, %protocol_type, "discovery_started");

        let (found, failure) = if protocol_type.is_bacnet() {
            match transport.who_is(timeout).await {
                Ok(devices) => (devices.into_iter().collect(), None),
                Err(err) => (BTreeSet::new(), Some(err.into_gateway(name))),
            }
        } else {
            self.probe_units(name, &transport, timeout).await
        };

        if let Some(err) = &failure {
            lease.record_failure(err).await;
        }
        drop(lease);

        self.manager.registry().replace_devices(name, found.clone());
        fpg_telemetry::record_discovery_run(found.len());

        match failure {
            None => {
                info!(target: "fpg.protocol", protocol = %name, devices = found.len(), "discovery_completed");
                Ok(found)
            }
            Some(source) => {
                warn!(target: "fpg.protocol", protocol = %name, devices = found.len(), error = %source, "discovery_partial");
                Err(DiscoveryError {
                    protocol: name.to_string(),
                    found,
                    source,
                })
            }
        }
    }

    async fn probe_units(
        &self,
        name: &str,
        transport: &Arc<dyn FieldTransport>,
        timeout: Duration,
    ) -> (BTreeSet<Device>, Option<GatewayError>) {
        let mut probes = stream::iter(1..=self.max_unit)
            .map(|unit| {
                let transport = transport.clone();
                async move { (unit, transport.probe(unit, timeout).await) }
            })
            .buffer_unordered(self.workers);

        let deadline = tokio::time::Instant::now() + self.deadline;
        let mut found = BTreeSet::new();
        loop {
            let next = match tokio::time::timeout_at(deadline, probes.next()).await {
                Ok(next) => next,
                Err(_elapsed) => {
                    let timeout_ms =
                        u64::try_from(self.deadline.as_millis()).unwrap_or(u64::MAX);
                    let point =
                        PointRef::new(name, format!("1..={}", self.max_unit), "discovery");
                    return (found, Some(GatewayError::Timeout { point, timeout_ms }));
                }
            };
            let Some((unit, result)) = next else {
                break;
            };
            match result {
                Ok(true) => {
                    found.insert(Device::new(unit.to_string(), format!("Modbus unit {}", unit)));
                }
                Ok(false) => {}
                // 传输失败时停止，未完成的探测随 stream 丢弃
                Err(err) => return (found, Some(err.into_gateway(name))),
            }
        }
        (found, None)
    }
}
