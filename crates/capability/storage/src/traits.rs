//! 存储接口 Trait 定义

use crate::error::StorageError;
use crate::models::{AuditLogRecord, GatewaySnapshot, RawSnapshot};
use async_trait::async_trait;

/// 配置快照存储接口。
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// 读取快照；尚未保存过时返回 None。点位保持原始 JSON，由调用方逐条校验。
    async fn load(&self) -> Result<Option<RawSnapshot>, StorageError>;

    /// 覆盖保存快照。
    async fn save(&self, snapshot: &GatewaySnapshot) -> Result<(), StorageError>;
}

/// 审计日志存储接口。
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn create_audit_log(&self, record: AuditLogRecord)
    -> Result<AuditLogRecord, StorageError>;

    /// 按时间倒序列出；`limit` 为 0 表示不限制。
    async fn list_audit_logs(
        &self,
        from_ms: Option<i64>,
        to_ms: Option<i64>,
        limit: usize,
    ) -> Result<Vec<AuditLogRecord>, StorageError>;
}
