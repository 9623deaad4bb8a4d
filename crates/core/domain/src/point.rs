//! 板卡通道点位模型。

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 板卡通道类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    UniversalInput,
    AnalogOutput,
    Relay,
    Triac,
}

impl ChannelType {
    /// 单块板卡上该类通道的最大编号（编号从 1 开始）。
    ///
    /// 继电器按 16 路板计算，8 路板的越界由驱动报错。
    pub fn max_index(self) -> u8 {
        match self {
            ChannelType::UniversalInput => 8,
            ChannelType::AnalogOutput => 4,
            ChannelType::Relay => 16,
            ChannelType::Triac => 4,
        }
    }

    pub fn is_writable(self) -> bool {
        !matches!(self, ChannelType::UniversalInput)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelType::UniversalInput => "universal_input",
            ChannelType::AnalogOutput => "analog_output",
            ChannelType::Relay => "relay",
            ChannelType::Triac => "triac",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 通用输入的信号类型。反序列化经过 [`FromStr`]，接受别名并拒绝未知取值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum InputType {
    /// 0-10V
    #[default]
    Voltage,
    /// 4-20mA
    Current,
    /// 热敏电阻 / RTD
    Resistance,
    /// 开关量（0-10V 逻辑域）
    Digital,
}

impl InputType {
    pub fn as_str(self) -> &'static str {
        match self {
            InputType::Voltage => "voltage",
            InputType::Current => "current",
            InputType::Resistance => "resistance",
            InputType::Digital => "digital",
        }
    }
}

impl FromStr for InputType {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "voltage" | "0-10v" => Ok(InputType::Voltage),
            "current" | "4-20ma" => Ok(InputType::Current),
            "resistance" | "thermistor" => Ok(InputType::Resistance),
            "digital" => Ok(InputType::Digital),
            _ => Err(ConfigError::UnknownInputType(value.to_string())),
        }
    }
}

impl TryFrom<String> for InputType {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 点位在现场总线上的暴露位置。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldBinding {
    pub protocol: String,
    pub device_id: String,
    pub address: String,
}

/// 逻辑点位：带工程量换算的命名 I/O 通道。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: String,
    pub board_id: String,
    pub channel_type: ChannelType,
    pub channel_index: u8,
    pub name: String,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub input_type: InputType,
    pub scaling_min: f64,
    pub scaling_max: f64,
    #[serde(default)]
    pub calibration_offset: f64,
    #[serde(default)]
    pub alarm_high: Option<f64>,
    #[serde(default)]
    pub alarm_low: Option<f64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub binding: Option<FieldBinding>,
}

fn default_enabled() -> bool {
    true
}

impl Point {
    /// 校验通道配置；配置错误在引入时同步拒绝。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(self.invalid("id required"));
        }
        if self.board_id.trim().is_empty() {
            return Err(self.invalid("board_id required"));
        }
        let max_index = self.channel_type.max_index();
        if self.channel_index == 0 || self.channel_index > max_index {
            return Err(self.invalid(format!(
                "{} index {} outside 1..={}",
                self.channel_type, self.channel_index, max_index
            )));
        }
        if !self.scaling_min.is_finite() || !self.scaling_max.is_finite() {
            return Err(self.invalid("scaling range must be finite"));
        }
        if self.scaling_min == self.scaling_max {
            return Err(self.invalid("scaling_min equals scaling_max"));
        }
        if let (Some(low), Some(high)) = (self.alarm_low, self.alarm_high) {
            if low >= high {
                return Err(self.invalid("alarm_low must be below alarm_high"));
            }
        }
        if self.channel_type == ChannelType::AnalogOutput
            && matches!(self.input_type, InputType::Resistance)
        {
            return Err(self.invalid("analog outputs cannot use resistance scaling"));
        }
        Ok(())
    }

    fn invalid(&self, detail: impl Into<String>) -> ConfigError {
        ConfigError::InvalidChannel {
            point: self.id.clone(),
            detail: detail.into(),
        }
    }
}
