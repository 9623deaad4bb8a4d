//! 网关统一错误分类。
//!
//! 每个错误都携带足够的上下文（协议名、设备、地址、错误种类），
//! 让运维人员区分"设备不可达"、"策略拒绝写入"与"配置错误"。

use std::fmt;

/// 点位定位信息：协议 / 设备 / 地址。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointRef {
    pub protocol: String,
    pub device_id: String,
    pub address: String,
}

impl PointRef {
    pub fn new(
        protocol: impl Into<String>,
        device_id: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            device_id: device_id.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for PointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.protocol, self.device_id, self.address)
    }
}

/// 配置错误：在引入配置的调用处同步拒绝。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("protocol `{0}` already exists")]
    DuplicateName(String),
    #[error("serial port {port} is owned by enabled protocol `{owner}`")]
    PortInUse { port: String, owner: String },
    #[error("invalid channel config for point `{point}`: {detail}")]
    InvalidChannel { point: String, detail: String },
    #[error("unknown input type: {0}")]
    UnknownInputType(String),
    #[error("invalid protocol config `{name}`: {detail}")]
    InvalidProtocol { name: String, detail: String },
}

/// 网关错误分类。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 传输层打开 / IO 失败
    #[error("connection error on `{protocol}`: {detail}")]
    Connection { protocol: String, detail: String },

    #[error("timeout after {timeout_ms}ms at {point}")]
    Timeout { point: PointRef, timeout_ms: u64 },

    /// 响应异常或格式错误
    #[error("protocol error at {point}: {detail}")]
    Protocol { point: PointRef, detail: String },

    #[error("invalid address {point}: {detail}")]
    InvalidAddress { point: PointRef, detail: String },

    #[error("protocol `{0}` is not connected")]
    NotConnected(String),

    #[error("write to {point} refused: maintenance mode active")]
    MaintenanceLocked { point: String },

    #[error("{0} is disabled")]
    Disabled(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("maintenance mode already active")]
    AlreadyActive,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl GatewayError {
    /// 稳定的错误码，供 API 层映射状态码。
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Config(ConfigError::DuplicateName(_)) => "CONFIG.DUPLICATE_NAME",
            GatewayError::Config(ConfigError::PortInUse { .. }) => "CONFIG.PORT_IN_USE",
            GatewayError::Config(ConfigError::InvalidChannel { .. }) => "CONFIG.INVALID_CHANNEL",
            GatewayError::Config(ConfigError::UnknownInputType(_)) => "CONFIG.UNKNOWN_INPUT_TYPE",
            GatewayError::Config(ConfigError::InvalidProtocol { .. }) => "CONFIG.INVALID_PROTOCOL",
            GatewayError::Connection { .. } => "FIELD.CONNECTION",
            GatewayError::Timeout { .. } => "FIELD.TIMEOUT",
            GatewayError::Protocol { .. } => "FIELD.PROTOCOL",
            GatewayError::InvalidAddress { .. } => "FIELD.INVALID_ADDRESS",
            GatewayError::NotConnected(_) => "FIELD.NOT_CONNECTED",
            GatewayError::MaintenanceLocked { .. } => "POLICY.MAINTENANCE_LOCKED",
            GatewayError::Disabled(_) => "POLICY.DISABLED",
            GatewayError::InvalidInput(_) => "INVALID.REQUEST",
            GatewayError::AlreadyActive => "MAINTENANCE.ALREADY_ACTIVE",
            GatewayError::NotFound(_) => "RESOURCE.NOT_FOUND",
            GatewayError::Cancelled => "REQUEST.CANCELLED",
        }
    }

    /// 是否可以在同一连接上重试。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Connection { .. } | GatewayError::Timeout { .. } | GatewayError::Protocol { .. }
        )
    }

    /// 是否表示传输层已经不可用（连接需要重建）。
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, GatewayError::Connection { .. })
    }
}
