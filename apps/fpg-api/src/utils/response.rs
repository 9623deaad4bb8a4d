//! HTTP 响应辅助函数
//!
//! 错误统一返回 `ApiResponse` 封装，状态码由 `GatewayError::code()` 决定。

use api_contract::{ApiResponse, AuditLogDto, RejectedItem};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::GatewayError;
use fpg_storage::{AuditLogRecord, StorageError};
use serde::Serialize;
use tracing::error;

/// 成功响应
pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// 错误码 -> HTTP 状态码
pub fn status_for(code: &str) -> StatusCode {
    match code {
        "CONFIG.DUPLICATE_NAME" | "CONFIG.PORT_IN_USE" => StatusCode::CONFLICT,
        "CONFIG.INVALID_CHANNEL" | "CONFIG.UNKNOWN_INPUT_TYPE" | "CONFIG.INVALID_PROTOCOL" => {
            StatusCode::BAD_REQUEST
        }
        "FIELD.CONNECTION" | "FIELD.PROTOCOL" => StatusCode::BAD_GATEWAY,
        "FIELD.TIMEOUT" => StatusCode::GATEWAY_TIMEOUT,
        "FIELD.INVALID_ADDRESS" | "INVALID.REQUEST" => StatusCode::BAD_REQUEST,
        "FIELD.NOT_CONNECTED" => StatusCode::SERVICE_UNAVAILABLE,
        "POLICY.MAINTENANCE_LOCKED" => StatusCode::LOCKED,
        "POLICY.DISABLED" | "MAINTENANCE.ALREADY_ACTIVE" => StatusCode::CONFLICT,
        "RESOURCE.NOT_FOUND" => StatusCode::NOT_FOUND,
        "REQUEST.CANCELLED" => StatusCode::REQUEST_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// 网关错误响应
pub fn gateway_error(err: GatewayError) -> Response {
    let code = err.code();
    (
        status_for(code),
        Json(ApiResponse::<()>::error(code, err.to_string())),
    )
        .into_response()
}

/// 失败但带部分结果
pub fn partial<T: Serialize>(data: T, err: GatewayError) -> Response {
    let code = err.code();
    (
        status_for(code),
        Json(ApiResponse::partial(data, code, err.to_string())),
    )
        .into_response()
}

/// 存储错误响应
pub fn storage_error(err: StorageError) -> Response {
    error!(target: "fpg.api", error = %err, "storage_failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error("INTERNAL.ERROR", err.to_string())),
    )
        .into_response()
}

pub fn rejected_item(name: String, err: &GatewayError) -> RejectedItem {
    RejectedItem {
        name,
        code: err.code().to_string(),
        message: err.to_string(),
    }
}

/// AuditLogRecord 转 AuditLogDto
pub fn audit_log_to_dto(record: AuditLogRecord) -> AuditLogDto {
    AuditLogDto {
        audit_id: record.audit_id,
        ts_ms: record.ts_ms,
        actor: record.actor,
        caller: record.caller,
        action: record.action,
        resource: record.resource,
        result: record.result,
        detail: record.detail,
    }
}
