//! 现场传输抽象

use crate::address::PointTarget;
use crate::bacnet::{BacnetIpTransport, BacnetMstpTransport};
use crate::error::TransportError;
use crate::modbus::ModbusTransport;
use async_trait::async_trait;
use domain::{Device, PointValue, ProtocolConfig, ProtocolType};
use std::sync::Arc;
use std::time::Duration;

/// 单个协议端点的运行时传输。
///
/// 同一协议的调用由连接管理器串行化；实现内部只需保证并发探测不会交错在半双工总线上。
#[async_trait]
pub trait FieldTransport: Send + Sync {
    /// 打开底层连接（串口 / TCP / UDP）。
    async fn connect(&self) -> Result<(), TransportError>;

    /// 关闭底层连接，可重复调用。
    async fn close(&self);

    async fn read(&self, target: &PointTarget) -> Result<PointValue, TransportError>;

    async fn write(&self, target: &PointTarget, value: &PointValue) -> Result<(), TransportError>;

    /// 探测站号是否存在：有响应（含异常响应）为 true，超时为 false。
    async fn probe(&self, unit: u8, timeout: Duration) -> Result<bool, TransportError>;

    /// 广播 Who-Is 并在窗口期内收集 I-Am。
    async fn who_is(&self, window: Duration) -> Result<Vec<Device>, TransportError>;
}

/// 按配置创建传输。测试中替换为 mock。
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        name: &str,
        config: &ProtocolConfig,
    ) -> Result<Arc<dyn FieldTransport>, TransportError>;
}

/// 生产环境传输工厂。
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create(
        &self,
        name: &str,
        config: &ProtocolConfig,
    ) -> Result<Arc<dyn FieldTransport>, TransportError> {
        let transport: Arc<dyn FieldTransport> = match config.protocol_type {
            ProtocolType::ModbusTcp | ProtocolType::ModbusRtu => {
                Arc::new(ModbusTransport::new(name, config.clone()))
            }
            ProtocolType::BacnetIp => Arc::new(BacnetIpTransport::new(name, config.clone())),
            ProtocolType::BacnetMstp => Arc::new(BacnetMstpTransport::new(name, config.clone())),
        };
        Ok(transport)
    }
}
