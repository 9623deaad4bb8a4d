//! 存储数据模型

use domain::{NamedProtocol, Point};
use serde::{Deserialize, Serialize};

/// 当前快照格式版本。
pub const SNAPSHOT_VERSION: u32 = 1;

/// 网关配置快照：协议集合与点位集合。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewaySnapshot<P = Point> {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub protocols: Vec<NamedProtocol>,
    #[serde(default)]
    pub points: Vec<P>,
}

/// 点位保留原始 JSON 的快照。读取与导入时使用，点位由目录逐条校验，
/// 单个点位无法解析不影响其余条目。
pub type RawSnapshot = GatewaySnapshot<serde_json::Value>;

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl<P> Default for GatewaySnapshot<P> {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            protocols: Vec::new(),
            points: Vec::new(),
        }
    }
}

impl<P> GatewaySnapshot<P> {
    pub fn new(protocols: Vec<NamedProtocol>, points: Vec<P>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            protocols,
            points,
        }
    }
}

impl<P: Serialize> GatewaySnapshot<P> {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl GatewaySnapshot {
    pub fn to_raw(&self) -> Result<RawSnapshot, serde_json::Error> {
        let points = self
            .points
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(GatewaySnapshot {
            version: self.version,
            protocols: self.protocols.clone(),
            points,
        })
    }
}

impl RawSnapshot {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// 审计记录。
///
/// `caller` 为 automatic / manual / system；`result` 为 ok / failed / refused。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogRecord {
    pub audit_id: String,
    pub ts_ms: i64,
    pub actor: String,
    pub caller: String,
    pub action: String,
    pub resource: String,
    pub result: String,
    pub detail: Option<String>,
}
