//! 审计记录写入
//!
//! 审计失败只记录告警日志，不影响业务结果。

use crate::clock::Clock;
use fpg_storage::{AuditLogRecord, AuditLogStore};
use std::sync::Arc;
use tracing::warn;

pub const ACTION_POINT_WRITE: &str = "POINT.WRITE";
pub const ACTION_LOCAL_WRITE: &str = "POINT.LOCAL.WRITE";
pub const ACTION_MAINTENANCE_ENABLE: &str = "MAINTENANCE.ENABLE";
pub const ACTION_MAINTENANCE_DISABLE: &str = "MAINTENANCE.DISABLE";
pub const ACTION_MAINTENANCE_EXPIRE: &str = "MAINTENANCE.EXPIRE";

pub const RESULT_OK: &str = "ok";
pub const RESULT_FAILED: &str = "failed";
pub const RESULT_REFUSED: &str = "refused";

#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn AuditLogStore>,
    clock: Arc<dyn Clock>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn AuditLogStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn AuditLogStore> {
        &self.store
    }

    pub async fn record(
        &self,
        actor: &str,
        caller: &str,
        action: &str,
        resource: String,
        result: &str,
        detail: Option<String>,
    ) {
        let record = AuditLogRecord {
            audit_id: uuid::Uuid::new_v4().to_string(),
            ts_ms: self.clock.now_ms(),
            actor: actor.to_string(),
            caller: caller.to_string(),
            action: action.to_string(),
            resource,
            result: result.to_string(),
            detail,
        };
        if let Err(err) = self.store.create_audit_log(record).await {
            warn!(target: "fpg.control", action = %action, error = %err, "audit_write_failed");
        }
    }
}
