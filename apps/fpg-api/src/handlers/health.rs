//! 健康检查
//!
//! - GET /health

use crate::AppState;
use crate::utils::ok;
use api_contract::HealthDto;
use axum::{extract::State, response::Response};

pub async fn health(State(state): State<AppState>) -> Response {
    let maintenance = state.maintenance.get_maintenance_status().await;
    ok(HealthDto {
        ok: true,
        protocols: state.manager.list_protocols().len(),
        maintenance_active: maintenance.state.enabled,
    })
}
