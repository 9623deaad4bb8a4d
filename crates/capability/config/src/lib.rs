//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 电阻型输入使用的温度换算曲线。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermistorProfile {
    Ntc10kType2,
    Ntc10kType3,
    Pt100,
    Pt1000,
}

impl ThermistorProfile {
    fn parse(key: &str, value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ntc10k_type2" | "10k" => Ok(Self::Ntc10kType2),
            "ntc10k_type3" => Ok(Self::Ntc10kType3),
            "pt100" => Ok(Self::Pt100),
            "pt1000" => Ok(Self::Pt1000),
            _ => Err(ConfigError::Invalid(key.to_string(), value.to_string())),
        }
    }
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    /// 未设置时配置只保存在内存中
    pub snapshot_path: Option<String>,
    pub discovery_workers: usize,
    pub discovery_max_unit: u8,
    /// Modbus 整轮发现的总时限
    pub discovery_deadline_ms: u64,
    pub audit_capacity: usize,
    pub maintenance_history_limit: usize,
    pub thermistor: ThermistorProfile,
    pub hardware_enabled: bool,
    pub megabas_bin: String,
    pub relay8_bin: String,
    pub relay16_bin: String,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr = env::var("FPG_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let snapshot_path = read_optional("FPG_SNAPSHOT_PATH");
        let discovery_workers = read_u64_with_default("FPG_DISCOVERY_WORKERS", 8)?;
        if discovery_workers == 0 {
            return Err(ConfigError::Invalid(
                "FPG_DISCOVERY_WORKERS".to_string(),
                "0".to_string(),
            ));
        }
        let discovery_max_unit = read_u8_with_default("FPG_DISCOVERY_MAX_UNIT", 247)?;
        if !(1..=247).contains(&discovery_max_unit) {
            return Err(ConfigError::Invalid(
                "FPG_DISCOVERY_MAX_UNIT".to_string(),
                discovery_max_unit.to_string(),
            ));
        }
        let discovery_deadline_ms = read_u64_with_default("FPG_DISCOVERY_DEADLINE_MS", 600_000)?;
        if discovery_deadline_ms == 0 {
            return Err(ConfigError::Invalid(
                "FPG_DISCOVERY_DEADLINE_MS".to_string(),
                "0".to_string(),
            ));
        }
        let audit_capacity = read_u64_with_default("FPG_AUDIT_CAPACITY", 10_000)?;
        let maintenance_history_limit =
            read_u64_with_default("FPG_MAINTENANCE_HISTORY_LIMIT", 100)?;
        let thermistor = match env::var("FPG_THERMISTOR") {
            Ok(value) => ThermistorProfile::parse("FPG_THERMISTOR", &value)?,
            Err(_) => ThermistorProfile::Ntc10kType2,
        };
        let hardware_enabled = read_bool_with_default("FPG_HARDWARE", false);
        let megabas_bin = env::var("FPG_MEGABAS_BIN").unwrap_or_else(|_| "megabas".to_string());
        let relay8_bin = env::var("FPG_RELAY8_BIN").unwrap_or_else(|_| "8relind".to_string());
        let relay16_bin = env::var("FPG_RELAY16_BIN").unwrap_or_else(|_| "16relind".to_string());

        Ok(Self {
            http_addr,
            snapshot_path,
            discovery_workers: discovery_workers as usize,
            discovery_max_unit,
            discovery_deadline_ms,
            audit_capacity: audit_capacity as usize,
            maintenance_history_limit: maintenance_history_limit as usize,
            thermistor,
            hardware_enabled,
            megabas_bin,
            relay8_bin,
            relay16_bin,
        })
    }
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
