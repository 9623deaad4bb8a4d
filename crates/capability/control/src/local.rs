//! 本地板卡点位读写
//!
//! 硬件驱动只认原始值（伏、毫安、欧姆、开关量），工程值换算由 [`ScalingEngine`] 完成。

use crate::audit::{ACTION_LOCAL_WRITE, AuditTrail, RESULT_FAILED, RESULT_OK, RESULT_REFUSED};
use crate::catalog::PointCatalog;
use crate::maintenance::MaintenanceService;
use async_trait::async_trait;
use domain::{CallerContext, ChannelType, ConfigError, GatewayError, InputType, Point, PointValue};
use fpg_normalize::{AlarmState, ScalingEngine, evaluate_alarm};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// 硬件驱动错误
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("invalid board id `{0}`")]
    InvalidBoard(String),

    #[error("board `{board}` has no {channel} channel {index}")]
    InvalidChannel {
        board: String,
        channel: ChannelType,
        index: u8,
    },

    /// 厂商命令返回非零退出码
    #[error("command failed: {0}")]
    Command(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected output: {0}")]
    Parse(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl HardwareError {
    pub fn into_gateway(self, point_id: &str) -> GatewayError {
        match self {
            HardwareError::InvalidBoard(_) | HardwareError::InvalidChannel { .. } => {
                ConfigError::InvalidChannel {
                    point: point_id.to_string(),
                    detail: self.to_string(),
                }
                .into()
            }
            other => GatewayError::Connection {
                protocol: "local".to_string(),
                detail: format!("point `{}`: {}", point_id, other),
            },
        }
    }
}

/// 板卡硬件驱动
#[async_trait]
pub trait HardwareDriver: Send + Sync {
    async fn read_raw(
        &self,
        board_id: &str,
        channel_type: ChannelType,
        channel_index: u8,
    ) -> Result<f64, HardwareError>;

    async fn write_raw(
        &self,
        board_id: &str,
        channel_type: ChannelType,
        channel_index: u8,
        raw: f64,
    ) -> Result<(), HardwareError>;

    /// 通用输入的电阻读数（欧姆）。
    async fn read_resistance(&self, board_id: &str, channel_index: u8) -> Result<f64, HardwareError> {
        let _ = (board_id, channel_index);
        Err(HardwareError::Unsupported(
            "resistance measurement".to_string(),
        ))
    }
}

/// 内存驱动：没有板卡时使用，读取返回最近一次写入（默认 0）。
#[derive(Default)]
pub struct SimulatedDriver {
    values: Mutex<HashMap<(String, ChannelType, u8), f64>>,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置原始值（通用输入的电阻型读数同样从这里取）。
    pub fn set_raw(&self, board_id: &str, channel_type: ChannelType, channel_index: u8, raw: f64) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((board_id.to_string(), channel_type, channel_index), raw);
    }

    fn get(&self, board_id: &str, channel_type: ChannelType, channel_index: u8) -> f64 {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(board_id.to_string(), channel_type, channel_index))
            .copied()
            .unwrap_or(0.0)
    }
}

#[async_trait]
impl HardwareDriver for SimulatedDriver {
    async fn read_raw(
        &self,
        board_id: &str,
        channel_type: ChannelType,
        channel_index: u8,
    ) -> Result<f64, HardwareError> {
        Ok(self.get(board_id, channel_type, channel_index))
    }

    async fn write_raw(
        &self,
        board_id: &str,
        channel_type: ChannelType,
        channel_index: u8,
        raw: f64,
    ) -> Result<(), HardwareError> {
        self.set_raw(board_id, channel_type, channel_index, raw);
        Ok(())
    }

    async fn read_resistance(&self, board_id: &str, channel_index: u8) -> Result<f64, HardwareError> {
        Ok(self.get(board_id, ChannelType::UniversalInput, channel_index))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalReading {
    pub point_id: String,
    pub raw: f64,
    pub value: PointValue,
    pub alarm: Option<AlarmState>,
}

pub struct LocalPointService {
    catalog: Arc<PointCatalog>,
    driver: Arc<dyn HardwareDriver>,
    scaling: ScalingEngine,
    maintenance: Arc<MaintenanceService>,
    audit: AuditTrail,
}

impl LocalPointService {
    pub fn new(
        catalog: Arc<PointCatalog>,
        driver: Arc<dyn HardwareDriver>,
        scaling: ScalingEngine,
        maintenance: Arc<MaintenanceService>,
        audit: AuditTrail,
    ) -> Self {
        Self {
            catalog,
            driver,
            scaling,
            maintenance,
            audit,
        }
    }

    pub fn catalog(&self) -> &Arc<PointCatalog> {
        &self.catalog
    }

    pub async fn read_local(&self, point_id: &str) -> Result<LocalReading, GatewayError> {
        let result = self.read_enabled(point_id).await;
        fpg_telemetry::record_point_read(result.is_ok());
        if let Err(err) = &result {
            warn!(target: "fpg.control", point_id = %point_id, error = %err, "local_read_failed");
        }
        result
    }

    async fn read_enabled(&self, point_id: &str) -> Result<LocalReading, GatewayError> {
        let point = self.catalog.get_point(point_id)?;
        if !point.enabled {
            return Err(disabled(&point));
        }
        let raw = if point.channel_type == ChannelType::UniversalInput
            && point.input_type == InputType::Resistance
        {
            self.driver
                .read_resistance(&point.board_id, point.channel_index)
                .await
        } else {
            self.driver
                .read_raw(&point.board_id, point.channel_type, point.channel_index)
                .await
        }
        .map_err(|err| err.into_gateway(&point.id))?;

        let value = self.scaling.to_engineering(raw, &point)?;
        let alarm = evaluate_alarm(&value, &point);
        Ok(LocalReading {
            point_id: point.id,
            raw,
            value,
            alarm,
        })
    }

    /// 返回写入板卡的原始值。
    pub async fn write_local(
        &self,
        point_id: &str,
        value: PointValue,
        caller: &CallerContext,
    ) -> Result<f64, GatewayError> {
        let result = if self.maintenance.blocks(caller).await {
            Err(GatewayError::MaintenanceLocked {
                point: format!("local/{}", point_id),
            })
        } else {
            self.write_enabled(point_id, &value).await
        };

        let outcome = match &result {
            Ok(raw) => {
                fpg_telemetry::record_point_write(true);
                info!(
                    target: "fpg.control",
                    point_id = %point_id,
                    value = %value,
                    raw,
                    caller = caller.label(),
                    actor = %caller.actor(),
                    "local_write_completed"
                );
                (RESULT_OK, format!("value={} raw={}", value, raw))
            }
            Err(err @ (GatewayError::MaintenanceLocked { .. } | GatewayError::Disabled(_))) => {
                fpg_telemetry::record_write_refused();
                warn!(target: "fpg.control", point_id = %point_id, caller = caller.label(), code = err.code(), "local_write_refused");
                (RESULT_REFUSED, err.to_string())
            }
            Err(err) => {
                fpg_telemetry::record_point_write(false);
                warn!(target: "fpg.control", point_id = %point_id, error = %err, "local_write_failed");
                (RESULT_FAILED, err.to_string())
            }
        };
        self.audit
            .record(
                caller.actor(),
                caller.label(),
                ACTION_LOCAL_WRITE,
                format!("local/{}", point_id),
                outcome.0,
                Some(outcome.1),
            )
            .await;
        result
    }

    async fn write_enabled(&self, point_id: &str, value: &PointValue) -> Result<f64, GatewayError> {
        let point = self.catalog.get_point(point_id)?;
        if !point.enabled {
            return Err(disabled(&point));
        }
        if !point.channel_type.is_writable() {
            return Err(GatewayError::InvalidInput(format!(
                "point `{}` is a {} and cannot be written",
                point.id, point.channel_type
            )));
        }
        let raw = self.scaling.to_raw(value, &point)?;
        self.driver
            .write_raw(&point.board_id, point.channel_type, point.channel_index, raw)
            .await
            .map_err(|err| err.into_gateway(&point.id))?;
        Ok(raw)
    }
}

fn disabled(point: &Point) -> GatewayError {
    GatewayError::Disabled(format!("point `{}`", point.id))
}
