//! 内存存储实现模块
//!
//! 用于测试与不落盘运行。

pub mod audit;
pub mod snapshot;

pub use audit::*;
pub use snapshot::*;
