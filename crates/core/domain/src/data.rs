use serde::{Deserialize, Serialize};
use std::fmt;

/// 点位值。
///
/// 在协议解码边界构造一次，之后所有使用方都必须穷尽匹配。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PointValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl PointValue {
    /// 值类型名称（用于日志与错误信息）。
    pub fn kind(&self) -> &'static str {
        match self {
            PointValue::Bool(_) => "bool",
            PointValue::Int(_) => "int",
            PointValue::Float(_) => "float",
            PointValue::String(_) => "string",
        }
    }

    /// 数值视图；字符串返回 None。
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PointValue::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
            PointValue::Int(value) => Some(*value as f64),
            PointValue::Float(value) => Some(*value),
            PointValue::String(_) => None,
        }
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointValue::Bool(value) => write!(f, "{}", value),
            PointValue::Int(value) => write!(f, "{}", value),
            PointValue::Float(value) => write!(f, "{}", value),
            PointValue::String(value) => write!(f, "{:?}", value),
        }
    }
}

/// 写操作的调用方上下文。
///
/// 由调用方显式携带，不从调用位置推断：
/// - `Automatic`：控制逻辑 / BMS 下发，检修期间被拦截
/// - `Manual`：运维人员直接操作，检修期间放行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "context", rename_all = "snake_case")]
pub enum CallerContext {
    Automatic { source: String },
    Manual { operator: String },
}

impl CallerContext {
    pub fn automatic(source: impl Into<String>) -> Self {
        Self::Automatic {
            source: source.into(),
        }
    }

    pub fn manual(operator: impl Into<String>) -> Self {
        Self::Manual {
            operator: operator.into(),
        }
    }

    pub fn is_automatic(&self) -> bool {
        matches!(self, CallerContext::Automatic { .. })
    }

    /// 审计用的操作者标识。
    pub fn actor(&self) -> &str {
        match self {
            CallerContext::Automatic { source } => source,
            CallerContext::Manual { operator } => operator,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CallerContext::Automatic { .. } => "automatic",
            CallerContext::Manual { .. } => "manual",
        }
    }
}
