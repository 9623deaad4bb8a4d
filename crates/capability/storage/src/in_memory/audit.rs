//! 审计日志内存实现

use crate::error::StorageError;
use crate::models::AuditLogRecord;
use crate::traits::AuditLogStore;
use std::sync::RwLock;

/// 审计日志内存存储
///
/// 超过容量时丢弃最旧记录。
pub struct InMemoryAuditLogStore {
    logs: RwLock<Vec<AuditLogRecord>>,
    capacity: usize,
}

impl InMemoryAuditLogStore {
    /// 默认保留 10000 条
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            logs: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }
}

impl Default for InMemoryAuditLogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AuditLogStore for InMemoryAuditLogStore {
    async fn create_audit_log(
        &self,
        record: AuditLogRecord,
    ) -> Result<AuditLogRecord, StorageError> {
        let mut logs = self
            .logs
            .write()
            .map_err(|_| StorageError::Lock("audit log"))?;
        logs.push(record.clone());
        if logs.len() > self.capacity {
            let overflow = logs.len() - self.capacity;
            logs.drain(..overflow);
        }
        Ok(record)
    }

    async fn list_audit_logs(
        &self,
        from_ms: Option<i64>,
        to_ms: Option<i64>,
        limit: usize,
    ) -> Result<Vec<AuditLogRecord>, StorageError> {
        let logs = self
            .logs
            .read()
            .map_err(|_| StorageError::Lock("audit log"))?;
        // 倒序遍历即最新在前，同毫秒内保持写入顺序的逆序
        let mut items: Vec<AuditLogRecord> = logs
            .iter()
            .rev()
            .filter(|item| match from_ms {
                Some(from) => item.ts_ms >= from,
                None => true,
            })
            .filter(|item| match to_ms {
                Some(to) => item.ts_ms <= to,
                None => true,
            })
            .cloned()
            .collect();
        if limit > 0 && items.len() > limit {
            items.truncate(limit);
        }
        Ok(items)
    }
}
