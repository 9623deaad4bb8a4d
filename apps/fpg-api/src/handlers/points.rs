//! 现场点位读写 handlers
//!
//! - POST /points/read
//! - POST /points/write
//!
//! 写入必须显式给出调用方类型（automatic / manual）与 actor；
//! 检修期间自动写入返回 423。

use crate::AppState;
use crate::utils::{gateway_error, ok};
use api_contract::{ReadPointRequest, ReadPointResponse, WritePointRequest, WritePointResponse};
use axum::{Json, extract::State, response::Response};
use domain::GatewayError;
use fpg_protocol::CallOptions;
use std::time::Duration;

fn call_options(deadline_ms: Option<u64>) -> CallOptions {
    match deadline_ms {
        Some(ms) => CallOptions::with_deadline(
            tokio::time::Instant::now() + Duration::from_millis(ms),
        ),
        None => CallOptions::default(),
    }
}

pub async fn read_point(
    State(state): State<AppState>,
    Json(req): Json<ReadPointRequest>,
) -> Response {
    let options = call_options(req.deadline_ms);
    match state
        .access
        .read_point_with(&req.protocol, &req.device_id, &req.address, &options)
        .await
    {
        Ok(value) => ok(ReadPointResponse {
            protocol: req.protocol,
            device_id: req.device_id,
            address: req.address,
            value,
        }),
        Err(err) => gateway_error(err),
    }
}

pub async fn write_point(
    State(state): State<AppState>,
    Json(req): Json<WritePointRequest>,
) -> Response {
    if req.actor.trim().is_empty() {
        return gateway_error(GatewayError::InvalidInput("actor required".to_string()));
    }
    let caller = req.context.into_caller(req.actor.trim());
    let options = call_options(req.deadline_ms);
    match state
        .access
        .write_point_with(
            &req.protocol,
            &req.device_id,
            &req.address,
            req.value,
            &caller,
            &options,
        )
        .await
    {
        Ok(()) => ok(WritePointResponse {
            protocol: req.protocol,
            device_id: req.device_id,
            address: req.address,
            written: true,
        }),
        Err(err) => gateway_error(err),
    }
}
