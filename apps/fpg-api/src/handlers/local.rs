//! 本地板卡点位 handlers
//!
//! - GET /points/local?board_id= - 点位列表
//! - POST /points/local - 新增或更新点位配置
//! - GET /points/local/{id} - 读取（工程值 + 告警）
//! - GET /points/local/{id}/config - 点位配置
//! - POST /points/local/{id}/write - 写入（工程值换算为原始值）
//! - POST /points/local/{id}/enabled - 启用 / 停用
//! - DELETE /boards/{board_id} - 移除板卡下所有点位

use crate::AppState;
use crate::utils::{gateway_error, ok};
use api_contract::{
    LocalReadingDto, LocalWriteRequest, LocalWriteResponse, PointListQuery, RemoveBoardResponse,
    SetEnabledRequest,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    response::Response,
};
use domain::GatewayError;
use fpg_control::decode_point;
use serde_json::Value;
use tracing::info;

#[derive(serde::Deserialize)]
pub struct LocalPointPath {
    point_id: String,
}

#[derive(serde::Deserialize)]
pub struct BoardPath {
    board_id: String,
}

pub async fn list_local_points(
    State(state): State<AppState>,
    Query(query): Query<PointListQuery>,
) -> Response {
    ok(state.catalog.list_points(query.board_id.as_deref()))
}

/// 点位先按原始 JSON 接收，字段错误也走统一的错误信封。
pub async fn upsert_local_point(
    State(state): State<AppState>,
    Json(raw): Json<Value>,
) -> Response {
    match decode_point(raw).and_then(|point| state.catalog.upsert_point(point)) {
        Ok(point) => ok(point),
        Err(err) => gateway_error(err),
    }
}

pub async fn get_local_point_config(
    State(state): State<AppState>,
    Path(path): Path<LocalPointPath>,
) -> Response {
    match state.catalog.get_point(&path.point_id) {
        Ok(point) => ok(point),
        Err(err) => gateway_error(err),
    }
}

pub async fn read_local_point(
    State(state): State<AppState>,
    Path(path): Path<LocalPointPath>,
) -> Response {
    match state.local.read_local(&path.point_id).await {
        Ok(reading) => ok(LocalReadingDto {
            point_id: reading.point_id,
            raw: reading.raw,
            value: reading.value,
            alarm: reading.alarm.map(|alarm| alarm.as_str().to_string()),
        }),
        Err(err) => gateway_error(err),
    }
}

pub async fn write_local_point(
    State(state): State<AppState>,
    Path(path): Path<LocalPointPath>,
    Json(req): Json<LocalWriteRequest>,
) -> Response {
    if req.actor.trim().is_empty() {
        return gateway_error(GatewayError::InvalidInput("actor required".to_string()));
    }
    let caller = req.context.into_caller(req.actor.trim());
    match state.local.write_local(&path.point_id, req.value, &caller).await {
        Ok(raw) => ok(LocalWriteResponse {
            point_id: path.point_id,
            raw,
        }),
        Err(err) => gateway_error(err),
    }
}

pub async fn set_local_point_enabled(
    State(state): State<AppState>,
    Path(path): Path<LocalPointPath>,
    Json(req): Json<SetEnabledRequest>,
) -> Response {
    match state.catalog.set_point_enabled(&path.point_id, req.enabled) {
        Ok(point) => ok(point),
        Err(err) => gateway_error(err),
    }
}

pub async fn remove_board(
    State(state): State<AppState>,
    Path(path): Path<BoardPath>,
) -> Response {
    let removed = state.catalog.remove_board(&path.board_id);
    info!(target: "fpg.api", board_id = %path.board_id, removed, "board_remove_requested");
    ok(RemoveBoardResponse {
        board_id: path.board_id,
        removed,
    })
}
