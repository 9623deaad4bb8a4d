//! # 现场协议能力模块
//!
//! 把现场总线（BACnet IP/MS-TP、Modbus TCP/RTU）统一为一组命名的协议端点：
//!
//! ```text
//! ProtocolRegistry（配置、串口归属、设备集合）
//!       │
//!       ▼
//! ConnectionManager（每协议一个 FIFO I/O 队列 + 连接状态机）
//!       │
//!       ├── ModbusTransport（tokio-modbus，TCP / RTU）
//!       ├── BacnetIpTransport（UDP / BVLC）
//!       └── BacnetMstpTransport（RS-485 帧）
//!       │
//!       ▼
//! DiscoveryService / 点位读写（fpg-control）
//! ```
//!
//! 不同协议之间没有共享锁；同一协议上的读写与发现按到达顺序排队。

pub mod address;
pub mod bacnet;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod modbus;
pub mod registry;
pub mod serial;
pub mod transport;
pub mod types;

pub use address::{parse_target, BacnetDevice, ObjectId, ObjectType, PointTarget, RegisterTable};
pub use bacnet::{BacnetIpTransport, BacnetMstpTransport};
pub use discovery::{DiscoveryError, DiscoveryService};
pub use error::TransportError;
pub use manager::{
    CallOptions, ConnectPolicy, ConnectionLease, ConnectionManager, ConnectionStatus,
    ProtocolSummary,
};
pub use modbus::ModbusTransport;
pub use registry::{DeviceListEvent, ProtocolRegistry};
pub use serial::{SerialPortLister, SystemSerialPorts};
pub use transport::{DefaultTransportFactory, FieldTransport, TransportFactory};
pub use types::ModbusDataType;
