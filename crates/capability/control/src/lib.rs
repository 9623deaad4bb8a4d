//! # 控制能力模块
//!
//! - [`PointAccessService`]：现场总线点位读写（重试、取消、审计）
//! - [`MaintenanceService`]：检修联锁，检修期间拦截自动写入
//! - [`LocalPointService`]：本地板卡点位读写（量程换算 + 硬件驱动）
//! - [`PointCatalog`]：点位目录
//!
//! 写入路径：
//!
//! ```text
//! CallerContext ──► 检修联锁 ──► 点位启用检查 ──► 协议 FIFO 队列 ──► 传输
//!                      │               │                               │
//!                      └── refused ────┴──────── AuditTrail ◄── ok / failed
//! ```

pub mod access;
pub mod audit;
pub mod catalog;
pub mod clock;
pub mod local;
pub mod maintenance;
pub mod megabas;

pub use access::PointAccessService;
pub use audit::AuditTrail;
pub use catalog::{PointCatalog, decode_point};
pub use clock::{Clock, ManualClock, SystemClock};
pub use local::{HardwareDriver, HardwareError, LocalPointService, LocalReading, SimulatedDriver};
pub use maintenance::{
    MaintenanceAction, MaintenanceInterlock, MaintenanceLogEntry, MaintenanceService,
    MaintenanceState, MaintenanceStatus,
};
pub use megabas::MegabasCliDriver;
