//! # FPG Storage 模块
//!
//! 网关配置与审计的持久化抽象。
//!
//! - [`models`]：`GatewaySnapshot`（协议集合 + 点位集合）、读取用的 `RawSnapshot` 与 `AuditLogRecord`
//! - [`traits`]：`SnapshotStore`、`AuditLogStore` 异步接口
//! - [`in_memory`]：`RwLock` 内存实现（测试与不落盘运行）
//! - [`json_file`]：JSON 文件快照实现（生产环境）
//!
//! 时序数据与趋势图不在本模块范围内。

pub mod error;
pub mod in_memory;
pub mod json_file;
pub mod models;
pub mod traits;

pub use error::*;
pub use in_memory::{InMemoryAuditLogStore, InMemorySnapshotStore};
pub use json_file::JsonFileSnapshotStore;
pub use models::*;
pub use traits::*;
