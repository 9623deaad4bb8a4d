//! 路由定义
//!
//! 集中管理所有 API 路由：
//! - 健康检查与指标：/health, /metrics
//! - 协议端点：/protocols/*, /serial-ports
//! - 现场点位：/points/read, /points/write
//! - 本地点位：/points/local/*, /boards/*
//! - 检修模式：/maintenance/*
//! - 配置快照：/config/*
//! - 审计日志：/audit

use crate::AppState;
use crate::handlers::*;
use axum::{
    Router,
    routing::{delete, get, post},
};

pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .route("/protocols", get(list_protocols).post(add_protocol))
        .route("/protocols/:name", delete(remove_protocol))
        .route("/protocols/:name/enable", post(enable_protocol))
        .route("/protocols/:name/disable", post(disable_protocol))
        .route("/protocols/:name/connect", post(connect_protocol))
        .route("/protocols/:name/discover", post(discover_devices))
        .route("/protocols/:name/devices", get(list_devices))
        .route("/serial-ports", get(list_serial_ports))
        .route("/points/read", post(read_point))
        .route("/points/write", post(write_point))
        .route(
            "/points/local",
            get(list_local_points).post(upsert_local_point),
        )
        .route("/points/local/:point_id", get(read_local_point))
        .route("/points/local/:point_id/config", get(get_local_point_config))
        .route("/points/local/:point_id/write", post(write_local_point))
        .route("/points/local/:point_id/enabled", post(set_local_point_enabled))
        .route("/boards/:board_id", delete(remove_board))
        .route("/maintenance", get(get_maintenance))
        .route("/maintenance/enable", post(enable_maintenance))
        .route("/maintenance/disable", post(disable_maintenance))
        .route("/maintenance/history", get(maintenance_history))
        .route("/config/save", post(save_config))
        .route("/config/export", get(export_config))
        .route("/config/import", post(import_config))
        .route("/audit", get(list_audit_logs))
}
