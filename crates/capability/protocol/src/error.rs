//! 传输层错误类型定义

use domain::{GatewayError, PointRef};

/// 传输层错误
///
/// 只描述"传输层看到了什么"，由调用方结合协议名与点位归类为 [`GatewayError`]。
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// 打开连接失败或连接已断开
    #[error("connection error: {0}")]
    Connection(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 等待响应超时
    #[error("timeout: {0}")]
    Timeout(String),

    /// 设备返回异常（Modbus exception / BACnet Error、Reject、Abort）
    #[error("device exception: {0}")]
    Exception(String),

    /// 设备报告地址不存在
    #[error("illegal address: {0}")]
    IllegalAddress(String),

    /// 响应报文无法解析
    #[error("decode error: {0}")]
    Decode(String),

    /// 写入值与目标类型不匹配
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// 当前传输不支持该操作
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl TransportError {
    /// 结合点位上下文归类为网关错误。
    pub fn classify(self, point: &PointRef, timeout_ms: u64) -> GatewayError {
        match self {
            TransportError::Connection(detail) => GatewayError::Connection {
                protocol: point.protocol.clone(),
                detail,
            },
            TransportError::Io(err) => GatewayError::Connection {
                protocol: point.protocol.clone(),
                detail: err.to_string(),
            },
            TransportError::Timeout(_) => GatewayError::Timeout {
                point: point.clone(),
                timeout_ms,
            },
            TransportError::Exception(detail)
            | TransportError::Decode(detail)
            | TransportError::Unsupported(detail) => GatewayError::Protocol {
                point: point.clone(),
                detail,
            },
            TransportError::IllegalAddress(detail) => GatewayError::InvalidAddress {
                point: point.clone(),
                detail,
            },
            TransportError::InvalidValue(detail) => {
                GatewayError::InvalidInput(format!("{}: {}", point, detail))
            }
        }
    }

    /// 不带点位上下文的归类（连接、发现阶段）。
    pub fn into_gateway(self, protocol: &str) -> GatewayError {
        match self {
            TransportError::IllegalAddress(detail) | TransportError::InvalidValue(detail) => {
                GatewayError::InvalidInput(detail)
            }
            other => GatewayError::Connection {
                protocol: protocol.to_string(),
                detail: other.to_string(),
            },
        }
    }
}
