//! 协议端点管理 handlers
//!
//! - GET /protocols - 列出协议及连接状态
//! - POST /protocols - 新增协议（重名、串口冲突返回 409）
//! - DELETE /protocols/{name} - 删除协议并关闭连接
//! - POST /protocols/{name}/enable | disable | connect
//! - POST /protocols/{name}/discover - 设备发现（未连接返回 503）
//! - GET /protocols/{name}/devices - 最近一次发现的设备
//! - GET /serial-ports - 主机可用串口

use crate::AppState;
use crate::utils::{gateway_error, ok, partial};
use api_contract::DiscoveryDto;
use axum::{
    Json,
    extract::{Path, State},
    response::Response,
};
use domain::NamedProtocol;
use tracing::info;

#[derive(serde::Deserialize)]
pub struct ProtocolPath {
    name: String,
}

pub async fn list_protocols(State(state): State<AppState>) -> Response {
    ok(state.manager.list_protocols())
}

pub async fn add_protocol(
    State(state): State<AppState>,
    Json(req): Json<NamedProtocol>,
) -> Response {
    match state.manager.add_protocol(&req.name, req.config.clone()) {
        Ok(()) => ok(req),
        Err(err) => gateway_error(err),
    }
}

pub async fn remove_protocol(
    State(state): State<AppState>,
    Path(path): Path<ProtocolPath>,
) -> Response {
    match state.manager.remove_protocol(&path.name).await {
        Ok(()) => ok(path.name),
        Err(err) => gateway_error(err),
    }
}

pub async fn enable_protocol(
    State(state): State<AppState>,
    Path(path): Path<ProtocolPath>,
) -> Response {
    status_after(&state, &path.name, state.manager.enable_protocol(&path.name).await)
}

pub async fn disable_protocol(
    State(state): State<AppState>,
    Path(path): Path<ProtocolPath>,
) -> Response {
    status_after(&state, &path.name, state.manager.disable_protocol(&path.name).await)
}

pub async fn connect_protocol(
    State(state): State<AppState>,
    Path(path): Path<ProtocolPath>,
) -> Response {
    status_after(&state, &path.name, state.manager.connect(&path.name).await)
}

fn status_after(
    state: &AppState,
    name: &str,
    result: Result<(), domain::GatewayError>,
) -> Response {
    match result.and_then(|()| state.manager.status(name)) {
        Ok(status) => ok(status),
        Err(err) => gateway_error(err),
    }
}

/// 设备发现
///
/// 中途失败时返回已找到的设备，`complete` 为 false，状态码取自失败原因。
pub async fn discover_devices(
    State(state): State<AppState>,
    Path(path): Path<ProtocolPath>,
) -> Response {
    match state.discovery.discover_devices(&path.name).await {
        Ok(devices) => {
            info!(target: "fpg.api", protocol = %path.name, devices = devices.len(), "discovery_requested");
            ok(DiscoveryDto {
                protocol: path.name,
                devices: devices.into_iter().collect(),
                complete: true,
            })
        }
        Err(err) if err.found.is_empty() => gateway_error(err.source),
        Err(err) => partial(
            DiscoveryDto {
                protocol: err.protocol,
                devices: err.found.into_iter().collect(),
                complete: false,
            },
            err.source,
        ),
    }
}

pub async fn list_devices(
    State(state): State<AppState>,
    Path(path): Path<ProtocolPath>,
) -> Response {
    match state.manager.devices(&path.name) {
        Ok(devices) => ok(devices.into_iter().collect::<Vec<_>>()),
        Err(err) => gateway_error(err),
    }
}

pub async fn list_serial_ports(State(state): State<AppState>) -> Response {
    match state.manager.get_available_serial_ports() {
        Ok(ports) => ok(ports),
        Err(err) => gateway_error(err),
    }
}
