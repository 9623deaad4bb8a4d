//! 审计日志查询
//!
//! - GET /audit?from=&to=&limit= - 按时间倒序，limit 缺省 100

use crate::AppState;
use crate::utils::{audit_log_to_dto, ok, storage_error};
use api_contract::AuditLogQuery;
use axum::{
    extract::{Query, State},
    response::Response,
};

const DEFAULT_LIMIT: usize = 100;

pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditLogQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    match state
        .audit_log_store
        .list_audit_logs(query.from, query.to, limit)
        .await
    {
        Ok(records) => ok(records
            .into_iter()
            .map(audit_log_to_dto)
            .collect::<Vec<_>>()),
        Err(err) => storage_error(err),
    }
}
