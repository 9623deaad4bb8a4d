//! 检修模式 handlers
//!
//! - GET /maintenance - 当前状态与剩余时间
//! - POST /maintenance/enable - 启用（1..=120 分钟，已启用返回 409）
//! - POST /maintenance/disable - 提前结束，未启用时为空操作
//! - GET /maintenance/history - 状态变更记录（新在前）

use crate::AppState;
use crate::utils::{gateway_error, ok};
use api_contract::{DisableMaintenanceRequest, EnableMaintenanceRequest};
use axum::{Json, extract::State, response::Response};
use domain::GatewayError;

pub async fn get_maintenance(State(state): State<AppState>) -> Response {
    ok(state.maintenance.get_maintenance_status().await)
}

pub async fn enable_maintenance(
    State(state): State<AppState>,
    Json(req): Json<EnableMaintenanceRequest>,
) -> Response {
    match state
        .maintenance
        .enable_maintenance_mode(&req.reason, &req.authorized_by, req.duration_minutes)
        .await
    {
        Ok(maintenance) => ok(maintenance),
        Err(err) => gateway_error(err),
    }
}

pub async fn disable_maintenance(
    State(state): State<AppState>,
    Json(req): Json<DisableMaintenanceRequest>,
) -> Response {
    if req.actor.trim().is_empty() {
        return gateway_error(GatewayError::InvalidInput("actor required".to_string()));
    }
    ok(state
        .maintenance
        .disable_maintenance_mode(req.actor.trim())
        .await)
}

pub async fn maintenance_history(State(state): State<AppState>) -> Response {
    ok(state.maintenance.maintenance_history().await)
}
