//! 稳定的 DTO 与 API 响应契约。
//!
//! 字段统一使用 snake_case，与配置快照文件中的协议 / 点位结构保持一致。

use domain::{CallerContext, Device, PointValue};
use serde::{Deserialize, Serialize};

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// 失败但携带部分结果（如中途失败的设备发现）。
    pub fn partial(data: T, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 健康检查
#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub ok: bool,
    pub protocols: usize,
    pub maintenance_active: bool,
}

/// 写入调用方类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerKind {
    Automatic,
    Manual,
}

impl CallerKind {
    pub fn into_caller(self, actor: impl Into<String>) -> CallerContext {
        match self {
            CallerKind::Automatic => CallerContext::automatic(actor),
            CallerKind::Manual => CallerContext::manual(actor),
        }
    }
}

/// 现场点位读取请求。
#[derive(Debug, Deserialize)]
pub struct ReadPointRequest {
    pub protocol: String,
    pub device_id: String,
    pub address: String,
    /// 整个调用的截止时间（毫秒，自收到请求起算）
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ReadPointResponse {
    pub protocol: String,
    pub device_id: String,
    pub address: String,
    pub value: PointValue,
}

/// 现场点位写入请求；`context` 与 `actor` 必须显式给出。
#[derive(Debug, Deserialize)]
pub struct WritePointRequest {
    pub protocol: String,
    pub device_id: String,
    pub address: String,
    pub value: PointValue,
    pub context: CallerKind,
    pub actor: String,
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct WritePointResponse {
    pub protocol: String,
    pub device_id: String,
    pub address: String,
    pub written: bool,
}

/// 设备发现结果；`complete` 为 false 时 `devices` 是中途失败前的部分结果。
#[derive(Debug, Serialize)]
pub struct DiscoveryDto {
    pub protocol: String,
    pub devices: Vec<Device>,
    pub complete: bool,
}

/// 本地点位写入请求。
#[derive(Debug, Deserialize)]
pub struct LocalWriteRequest {
    pub value: PointValue,
    pub context: CallerKind,
    pub actor: String,
}

#[derive(Debug, Serialize)]
pub struct LocalReadingDto {
    pub point_id: String,
    pub raw: f64,
    pub value: PointValue,
    pub alarm: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LocalWriteResponse {
    pub point_id: String,
    pub raw: f64,
}

/// 本地点位列表查询。
#[derive(Debug, Deserialize)]
pub struct PointListQuery {
    pub board_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct RemoveBoardResponse {
    pub board_id: String,
    pub removed: usize,
}

#[derive(Debug, Deserialize)]
pub struct EnableMaintenanceRequest {
    pub reason: String,
    pub authorized_by: String,
    pub duration_minutes: u32,
}

#[derive(Debug, Deserialize)]
pub struct DisableMaintenanceRequest {
    pub actor: String,
}

/// 导入时被拒绝的条目。
#[derive(Debug, Serialize)]
pub struct RejectedItem {
    pub name: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub protocols_imported: usize,
    pub points_imported: usize,
    pub rejected: Vec<RejectedItem>,
}

#[derive(Debug, Serialize)]
pub struct SaveReport {
    pub protocols: usize,
    pub points: usize,
    /// 未配置快照文件时为 false（仅内存）
    pub persisted: bool,
}

/// 审计日志查询参数。
#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AuditLogDto {
    pub audit_id: String,
    pub ts_ms: i64,
    pub actor: String,
    pub caller: String,
    pub action: String,
    pub resource: String,
    pub result: String,
    pub detail: Option<String>,
}

/// 计数指标快照。
#[derive(Debug, Serialize)]
pub struct MetricsSnapshotDto {
    pub point_reads: u64,
    pub point_read_failures: u64,
    pub point_writes: u64,
    pub point_write_failures: u64,
    pub writes_refused: u64,
    pub field_attempts: u64,
    pub field_retries: u64,
    pub field_latency_ms_total: u64,
    pub field_latency_ms_count: u64,
    pub connections_opened: u64,
    pub connection_failures: u64,
    pub discovery_runs: u64,
    pub devices_discovered: u64,
    pub maintenance_transitions: u64,
}
