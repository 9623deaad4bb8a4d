//! 现场点位网关的核心领域模型：所有能力模块共享的数据结构与错误分类。

pub mod data;
pub mod error;
pub mod point;
pub mod protocol;

pub use data::{CallerContext, PointValue};
pub use error::{ConfigError, GatewayError, PointRef};
pub use point::{ChannelType, FieldBinding, InputType, Point};
pub use protocol::{
    ConnectionState, ConnectionType, Device, NamedProtocol, Parity, ProtocolConfig, ProtocolType,
};

/// 当前时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
