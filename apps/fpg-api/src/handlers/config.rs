//! 配置快照 handlers
//!
//! - POST /config/save - 写入快照文件
//! - GET /config/export - 导出当前协议与点位
//! - POST /config/import - 逐条导入，返回被拒绝的条目

use crate::AppState;
use crate::utils::{ok, rejected_item, storage_error};
use api_contract::{ImportReport, SaveReport};
use axum::{Json, extract::State, response::Response};
use fpg_storage::RawSnapshot;
use tracing::info;

pub async fn save_config(State(state): State<AppState>) -> Response {
    let snapshot = state.snapshot();
    match state.persist().await {
        Ok(persisted) => ok(SaveReport {
            protocols: snapshot.protocols.len(),
            points: snapshot.points.len(),
            persisted,
        }),
        Err(err) => storage_error(err),
    }
}

pub async fn export_config(State(state): State<AppState>) -> Response {
    ok(state.snapshot())
}

pub async fn import_config(
    State(state): State<AppState>,
    Json(snapshot): Json<RawSnapshot>,
) -> Response {
    let protocols = snapshot.protocols.len();
    let points = snapshot.points.len();
    let mut rejected: Vec<_> = state
        .manager
        .import_protocols(snapshot.protocols)
        .into_iter()
        .map(|(named, err)| rejected_item(named.name, &err))
        .collect();
    let rejected_protocols = rejected.len();
    rejected.extend(
        state
            .catalog
            .import_points(snapshot.points)
            .into_iter()
            .map(|(id, err)| rejected_item(id, &err)),
    );
    let rejected_points = rejected.len() - rejected_protocols;
    info!(
        target: "fpg.api",
        protocols,
        points,
        rejected = rejected.len(),
        "config_imported"
    );
    ok(ImportReport {
        protocols_imported: protocols - rejected_protocols,
        points_imported: points - rejected_points,
        rejected,
    })
}
