//! 协议注册表
//!
//! 保存命名的协议配置、串口归属与各协议最近一次发现的设备集合。
//! 只做同步的配置校验与存取；运行时连接由 [`crate::ConnectionManager`] 负责。

use domain::{ConfigError, ConnectionType, Device, GatewayError, NamedProtocol, ProtocolConfig};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 32;

/// 设备列表更新事件，每次发现结束时发布。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceListEvent {
    pub protocol: String,
    pub devices: Vec<Device>,
}

pub struct ProtocolRegistry {
    configs: RwLock<HashMap<String, ProtocolConfig>>,
    devices: RwLock<HashMap<String, BTreeSet<Device>>>,
    events: broadcast::Sender<DeviceListEvent>,
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            configs: RwLock::new(HashMap::new()),
            devices: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// 校验并保存配置，不打开任何传输。
    pub fn add(&self, name: &str, config: ProtocolConfig) -> Result<(), GatewayError> {
        validate(name, &config)?;
        let mut configs = self.configs.write().unwrap_or_else(PoisonError::into_inner);
        if configs.contains_key(name) {
            return Err(ConfigError::DuplicateName(name.to_string()).into());
        }
        if let Some(port) = config.connection.serial_port() {
            if let Some(owner) = port_owner(&configs, port, name) {
                return Err(ConfigError::PortInUse {
                    port: port.to_string(),
                    owner,
                }
                .into());
            }
        }
        configs.insert(name.to_string(), config);
        Ok(())
    }

    /// 删除配置与已发现设备。
    pub fn remove(&self, name: &str) -> Result<ProtocolConfig, GatewayError> {
        let removed = self
            .configs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .ok_or_else(|| not_found(name))?;
        self.devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Result<ProtocolConfig, GatewayError> {
        self.configs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    /// 切换启用状态；启用时重新检查串口归属。
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<ProtocolConfig, GatewayError> {
        let mut configs = self.configs.write().unwrap_or_else(PoisonError::into_inner);
        let port = configs
            .get(name)
            .ok_or_else(|| not_found(name))?
            .connection
            .serial_port()
            .map(str::to_string);
        if enabled {
            if let Some(port) = port {
                if let Some(owner) = port_owner(&configs, &port, name) {
                    return Err(ConfigError::PortInUse { port, owner }.into());
                }
            }
        }
        let config = configs.get_mut(name).ok_or_else(|| not_found(name))?;
        config.enabled = enabled;
        Ok(config.clone())
    }

    /// 全部配置，按名称排序。
    pub fn list(&self) -> Vec<NamedProtocol> {
        let configs = self.configs.read().unwrap_or_else(PoisonError::into_inner);
        let mut items: Vec<NamedProtocol> = configs
            .iter()
            .map(|(name, config)| NamedProtocol {
                name: name.clone(),
                config: config.clone(),
            })
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items
    }

    pub fn devices(&self, name: &str) -> Result<BTreeSet<Device>, GatewayError> {
        self.get(name)?;
        Ok(self
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    pub fn device_count(&self, name: &str) -> usize {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(BTreeSet::len)
            .unwrap_or(0)
    }

    /// 用本次发现结果替换设备集合（不合并），并发布事件。
    pub fn replace_devices(&self, name: &str, devices: BTreeSet<Device>) {
        let event = DeviceListEvent {
            protocol: name.to_string(),
            devices: devices.iter().cloned().collect(),
        };
        self.devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), devices);
        // 没有订阅者时发送失败，忽略
        let _ = self.events.send(event);
    }

    pub fn subscribe_devices(&self) -> broadcast::Receiver<DeviceListEvent> {
        self.events.subscribe()
    }
}

/// 其它已启用配置占用同一串口时返回其名称。
fn port_owner(
    configs: &HashMap<String, ProtocolConfig>,
    port: &str,
    excluding: &str,
) -> Option<String> {
    configs
        .iter()
        .find(|(name, config)| {
            name.as_str() != excluding
                && config.enabled
                && config.connection.serial_port() == Some(port)
        })
        .map(|(name, _)| name.clone())
}

fn not_found(name: &str) -> GatewayError {
    GatewayError::NotFound(format!("protocol `{}`", name))
}

fn invalid(name: &str, detail: impl Into<String>) -> GatewayError {
    ConfigError::InvalidProtocol {
        name: name.to_string(),
        detail: detail.into(),
    }
    .into()
}

fn validate(name: &str, config: &ProtocolConfig) -> Result<(), GatewayError> {
    if name.trim().is_empty() {
        return Err(invalid(name, "name must not be empty"));
    }
    if config.timeout_ms == 0 {
        return Err(invalid(name, "timeout_ms must be greater than zero"));
    }
    match &config.connection {
        ConnectionType::Serial {
            port, baud_rate, ..
        } => {
            if !config.protocol_type.is_serial() {
                return Err(invalid(
                    name,
                    format!("{} requires a network connection", config.protocol_type),
                ));
            }
            if port.trim().is_empty() {
                return Err(invalid(name, "serial port must not be empty"));
            }
            if *baud_rate == 0 {
                return Err(invalid(name, "baud_rate must be greater than zero"));
            }
        }
        ConnectionType::Network { ip_address, .. } => {
            if config.protocol_type.is_serial() {
                return Err(invalid(
                    name,
                    format!("{} requires a serial connection", config.protocol_type),
                ));
            }
            if ip_address.trim().is_empty() {
                return Err(invalid(name, "ip_address must not be empty"));
            }
        }
    }
    if config.station_address == Some(255) {
        return Err(invalid(name, "station_address 255 is the broadcast address"));
    }
    Ok(())
}
