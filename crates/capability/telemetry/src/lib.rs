//! 追踪、请求 ID 生成与网关计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
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

/// 网关计数指标。
pub struct TelemetryMetrics {
    point_reads: AtomicU64,
    point_read_failures: AtomicU64,
    point_writes: AtomicU64,
    point_write_failures: AtomicU64,
    writes_refused: AtomicU64,
    field_attempts: AtomicU64,
    field_retries: AtomicU64,
    field_latency_ms_total: AtomicU64,
    field_latency_ms_count: AtomicU64,
    connections_opened: AtomicU64,
    connection_failures: AtomicU64,
    discovery_runs: AtomicU64,
    devices_discovered: AtomicU64,
    maintenance_transitions: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            point_reads: AtomicU64::new(0),
            point_read_failures: AtomicU64::new(0),
            point_writes: AtomicU64::new(0),
            point_write_failures: AtomicU64::new(0),
            writes_refused: AtomicU64::new(0),
            field_attempts: AtomicU64::new(0),
            field_retries: AtomicU64::new(0),
            field_latency_ms_total: AtomicU64::new(0),
            field_latency_ms_count: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            discovery_runs: AtomicU64::new(0),
            devices_discovered: AtomicU64::new(0),
            maintenance_transitions: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            point_reads: self.point_reads.load(Ordering::Relaxed),
            point_read_failures: self.point_read_failures.load(Ordering::Relaxed),
            point_writes: self.point_writes.load(Ordering::Relaxed),
            point_write_failures: self.point_write_failures.load(Ordering::Relaxed),
            writes_refused: self.writes_refused.load(Ordering::Relaxed),
            field_attempts: self.field_attempts.load(Ordering::Relaxed),
            field_retries: self.field_retries.load(Ordering::Relaxed),
            field_latency_ms_total: self.field_latency_ms_total.load(Ordering::Relaxed),
            field_latency_ms_count: self.field_latency_ms_count.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            discovery_runs: self.discovery_runs.load(Ordering::Relaxed),
            devices_discovered: self.devices_discovered.load(Ordering::Relaxed),
            maintenance_transitions: self.maintenance_transitions.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录点位读取结果。
pub fn record_point_read(success: bool) {
    let metrics = metrics();
    metrics.point_reads.fetch_add(1, Ordering::Relaxed);
    if !success {
        metrics.point_read_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// 记录点位写入结果。
pub fn record_point_write(success: bool) {
    let metrics = metrics();
    metrics.point_writes.fetch_add(1, Ordering::Relaxed);
    if !success {
        metrics.point_write_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// 记录检修联锁拒绝的自动写入。
pub fn record_write_refused() {
    metrics().writes_refused.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次现场总线事务尝试；`attempt` 从 1 开始，大于 1 计为重试。
pub fn record_field_attempt(attempt: u32) {
    let metrics = metrics();
    metrics.field_attempts.fetch_add(1, Ordering::Relaxed);
    if attempt > 1 {
        metrics.field_retries.fetch_add(1, Ordering::Relaxed);
    }
}

/// 记录现场总线事务耗时（毫秒）。
pub fn record_field_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .field_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .field_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_connection_opened() {
    metrics().connections_opened.fetch_add(1, Ordering::Relaxed);
}

pub fn record_connection_failure() {
    metrics()
        .connection_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录一次设备发现及发现数量。
pub fn record_discovery_run(devices: usize) {
    let metrics = metrics();
    metrics.discovery_runs.fetch_add(1, Ordering::Relaxed);
    metrics
        .devices_discovered
        .fetch_add(devices as u64, Ordering::Relaxed);
}

pub fn record_maintenance_transition() {
    metrics()
        .maintenance_transitions
        .fetch_add(1, Ordering::Relaxed);
}
