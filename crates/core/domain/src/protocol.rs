//! 现场协议配置与运行时连接模型。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 现场协议类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolType {
    BacnetIp,
    BacnetMstp,
    ModbusTcp,
    ModbusRtu,
}

impl ProtocolType {
    /// 是否运行在 RS-485 串口上。
    pub fn is_serial(self) -> bool {
        matches!(self, ProtocolType::BacnetMstp | ProtocolType::ModbusRtu)
    }

    pub fn is_bacnet(self) -> bool {
        matches!(self, ProtocolType::BacnetIp | ProtocolType::BacnetMstp)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolType::BacnetIp => "bacnet_ip",
            ProtocolType::BacnetMstp => "bacnet_mstp",
            ProtocolType::ModbusTcp => "modbus_tcp",
            ProtocolType::ModbusRtu => "modbus_rtu",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 串口校验位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// 传输层连接参数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConnectionType {
    Serial {
        /// /dev/ttyUSB0 等
        port: String,
        baud_rate: u32,
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
        #[serde(default)]
        parity: Parity,
    },
    Network {
        ip_address: String,
        port: u16,
        /// eth0、wlan0 等
        #[serde(default)]
        interface: Option<String>,
    },
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

impl ConnectionType {
    /// 串口连接占用的端口名。
    pub fn serial_port(&self) -> Option<&str> {
        match self {
            ConnectionType::Serial { port, .. } => Some(port),
            ConnectionType::Network { .. } => None,
        }
    }
}

/// 协议端点配置。名称作为注册表主键，不在结构体内重复保存。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub protocol_type: ProtocolType,
    pub connection: ConnectionType,
    pub timeout_ms: u64,
    pub retry_count: u8,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// MS/TP 本站地址，缺省为 1。
    #[serde(default)]
    pub station_address: Option<u8>,
}

fn default_enabled() -> bool {
    true
}

impl ProtocolConfig {
    /// 实际尝试次数（至少一次）。
    pub fn attempts(&self) -> u32 {
        u32::from(self.retry_count.max(1))
    }
}

/// 命名的协议配置（快照与列表使用）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedProtocol {
    pub name: String,
    pub config: ProtocolConfig,
}

/// 运行时连接状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        f.write_str(label)
    }
}

/// 发现得到的设备。`id` 即点位读写使用的 device_id。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub description: String,
}

impl Device {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}
