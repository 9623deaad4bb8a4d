//! 量程换算：板卡原始值 ↔ 工程值。
//!
//! 换算是 `(raw, Point)` 的确定性纯函数；热敏电阻换算策略可注入。

mod thermistor;

pub use thermistor::{Rtd, SteinhartHart, TemperatureConverter};

use domain::{ChannelType, ConfigError, GatewayError, InputType, Point, PointValue};
use std::sync::Arc;

/// 换算错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

impl From<NormalizeError> for GatewayError {
    fn from(err: NormalizeError) -> Self {
        match err {
            NormalizeError::Config(err) => GatewayError::Config(err),
            NormalizeError::InvalidValue(detail) => GatewayError::InvalidInput(detail),
        }
    }
}

/// 告警状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    High,
    Low,
}

impl AlarmState {
    pub fn as_str(self) -> &'static str {
        match self {
            AlarmState::High => "high",
            AlarmState::Low => "low",
        }
    }
}

/// 量程换算引擎。
#[derive(Clone, Default)]
pub struct ScalingEngine {
    converter: Option<Arc<dyn TemperatureConverter>>,
}

impl ScalingEngine {
    /// 不带温度换算策略（电阻型输入会报配置错误）。
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_converter(converter: Arc<dyn TemperatureConverter>) -> Self {
        Self {
            converter: Some(converter),
        }
    }

    /// 原始值 -> 工程值。
    pub fn to_engineering(&self, raw: f64, point: &Point) -> Result<PointValue, NormalizeError> {
        check_span(point)?;
        match point.channel_type {
            ChannelType::Relay => return Ok(PointValue::Bool(raw >= 0.5)),
            ChannelType::Triac => return Ok(PointValue::Float(raw)),
            ChannelType::UniversalInput | ChannelType::AnalogOutput => {}
        }

        let span = point.scaling_max - point.scaling_min;
        let value = match point.input_type {
            InputType::Digital => return Ok(PointValue::Bool(raw > 5.0)),
            InputType::Voltage => raw * span / 10.0 + point.scaling_min,
            InputType::Current => (raw - 4.0) / 16.0 * span + point.scaling_min,
            InputType::Resistance => {
                let celsius = self.converter(point)?.to_celsius(raw);
                if is_fahrenheit(&point.units) {
                    celsius * 9.0 / 5.0 + 32.0
                } else {
                    celsius
                }
            }
        };
        Ok(PointValue::Float(value + point.calibration_offset))
    }

    /// 工程值 -> 原始值，`to_engineering` 的逆运算。超出量程不截断。
    pub fn to_raw(&self, value: &PointValue, point: &Point) -> Result<f64, NormalizeError> {
        check_span(point)?;
        match point.channel_type {
            ChannelType::Relay => return switch_raw(value, point, 1.0),
            ChannelType::Triac => return numeric(value, point),
            ChannelType::UniversalInput | ChannelType::AnalogOutput => {}
        }

        if point.input_type == InputType::Digital {
            return switch_raw(value, point, 10.0);
        }

        let engineering = numeric(value, point)? - point.calibration_offset;
        let span = point.scaling_max - point.scaling_min;
        match point.input_type {
            InputType::Voltage => Ok((engineering - point.scaling_min) * 10.0 / span),
            InputType::Current => Ok((engineering - point.scaling_min) / span * 16.0 + 4.0),
            InputType::Resistance => {
                let celsius = if is_fahrenheit(&point.units) {
                    (engineering - 32.0) * 5.0 / 9.0
                } else {
                    engineering
                };
                Ok(self.converter(point)?.to_ohms(celsius))
            }
            InputType::Digital => switch_raw(value, point, 10.0),
        }
    }

    fn converter(&self, point: &Point) -> Result<&Arc<dyn TemperatureConverter>, NormalizeError> {
        self.converter.as_ref().ok_or_else(|| {
            NormalizeError::Config(ConfigError::InvalidChannel {
                point: point.id.clone(),
                detail: "no temperature converter configured for resistance input".to_string(),
            })
        })
    }
}

/// 按点位告警上下限判断。非数值不产生告警。
pub fn evaluate_alarm(value: &PointValue, point: &Point) -> Option<AlarmState> {
    let value = match value {
        PointValue::Int(value) => *value as f64,
        PointValue::Float(value) => *value,
        PointValue::Bool(_) | PointValue::String(_) => return None,
    };
    if let Some(high) = point.alarm_high {
        if value > high {
            return Some(AlarmState::High);
        }
    }
    if let Some(low) = point.alarm_low {
        if value < low {
            return Some(AlarmState::Low);
        }
    }
    None
}

fn check_span(point: &Point) -> Result<(), NormalizeError> {
    if point.scaling_max == point.scaling_min {
        return Err(NormalizeError::Config(ConfigError::InvalidChannel {
            point: point.id.clone(),
            detail: "scaling_min equals scaling_max".to_string(),
        }));
    }
    Ok(())
}

fn is_fahrenheit(units: &str) -> bool {
    let units = units.trim().to_ascii_lowercase();
    matches!(units.as_str(), "°f" | "f" | "degf" | "fahrenheit")
}

fn numeric(value: &PointValue, point: &Point) -> Result<f64, NormalizeError> {
    match value {
        PointValue::Int(value) => Ok(*value as f64),
        PointValue::Float(value) if value.is_finite() => Ok(*value),
        PointValue::Float(value) => Err(NormalizeError::InvalidValue(format!(
            "{} is not a finite number for point {}",
            value, point.id
        ))),
        PointValue::Bool(_) | PointValue::String(_) => Err(NormalizeError::InvalidValue(format!(
            "{} value not accepted by {} point {}",
            value.kind(),
            point.channel_type,
            point.id
        ))),
    }
}

fn switch_raw(value: &PointValue, point: &Point, on: f64) -> Result<f64, NormalizeError> {
    match value {
        PointValue::Bool(state) => Ok(if *state { on } else { 0.0 }),
        PointValue::Int(0) => Ok(0.0),
        PointValue::Int(1) => Ok(on),
        other => Err(NormalizeError::InvalidValue(format!(
            "{} value not accepted by switched point {}",
            other.kind(),
            point.id
        ))),
    }
}
