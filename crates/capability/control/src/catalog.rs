//! 点位目录：板卡通道点位的增删改查与导入导出。
//!
//! 绑定按所属协议的地址规则解析后比较，`hr:41`、`HR:41:uint16` 与 `HR:41`
//! 视为同一现场位置。

use domain::{ConfigError, FieldBinding, GatewayError, InputType, Point, ProtocolType};
use fpg_protocol::{PointTarget, ProtocolRegistry, parse_target};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

pub struct PointCatalog {
    registry: Arc<ProtocolRegistry>,
    points: RwLock<BTreeMap<String, Point>>,
}

impl PointCatalog {
    pub fn new(registry: Arc<ProtocolRegistry>) -> Self {
        Self {
            registry,
            points: RwLock::new(BTreeMap::new()),
        }
    }

    /// 校验后新增或覆盖；绑定必须指向已注册协议且地址可解析，
    /// 同一现场位置只能绑定一个点位。
    pub fn upsert_point(&self, point: Point) -> Result<Point, GatewayError> {
        point.validate()?;
        let resolved = match &point.binding {
            Some(binding) => Some((binding, self.resolve(&point.id, binding)?)),
            None => None,
        };
        let mut points = self.points.write().unwrap_or_else(PoisonError::into_inner);
        if let Some((binding, (protocol_type, target))) = resolved {
            let taken = points.values().find(|other| {
                other.id != point.id
                    && bound_target(other, &binding.protocol, protocol_type)
                        .is_some_and(|other| other.overlaps(&target))
            });
            if let Some(other) = taken {
                return Err(ConfigError::InvalidChannel {
                    point: point.id.clone(),
                    detail: format!(
                        "binding {}/{}/{} already used by `{}`",
                        binding.protocol, binding.device_id, binding.address, other.id
                    ),
                }
                .into());
            }
        }
        info!(
            target: "fpg.control",
            point_id = %point.id,
            board_id = %point.board_id,
            channel = %point.channel_type,
            index = point.channel_index,
            "point_upserted"
        );
        points.insert(point.id.clone(), point.clone());
        Ok(point)
    }

    fn resolve(
        &self,
        point_id: &str,
        binding: &FieldBinding,
    ) -> Result<(ProtocolType, PointTarget), GatewayError> {
        let invalid = |detail: String| -> GatewayError {
            ConfigError::InvalidChannel {
                point: point_id.to_string(),
                detail,
            }
            .into()
        };
        let config = self.registry.get(&binding.protocol).map_err(|_| {
            invalid(format!(
                "binding protocol `{}` is not registered",
                binding.protocol
            ))
        })?;
        let target = parse_target(config.protocol_type, &binding.device_id, &binding.address)
            .map_err(|err| {
                invalid(format!(
                    "binding {}/{}/{}: {}",
                    binding.protocol, binding.device_id, binding.address, err
                ))
            })?;
        Ok((config.protocol_type, target))
    }

    pub fn set_point_enabled(&self, point_id: &str, enabled: bool) -> Result<Point, GatewayError> {
        let mut points = self.points.write().unwrap_or_else(PoisonError::into_inner);
        let point = points
            .get_mut(point_id)
            .ok_or_else(|| not_found(point_id))?;
        point.enabled = enabled;
        Ok(point.clone())
    }

    pub fn get_point(&self, point_id: &str) -> Result<Point, GatewayError> {
        self.points
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(point_id)
            .cloned()
            .ok_or_else(|| not_found(point_id))
    }

    /// 按 id 排序；可按板卡过滤。
    pub fn list_points(&self, board_id: Option<&str>) -> Vec<Point> {
        self.points
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|point| board_id.is_none_or(|board| point.board_id == board))
            .cloned()
            .collect()
    }

    /// 删除板卡的全部点位，返回删除数量。
    pub fn remove_board(&self, board_id: &str) -> usize {
        let mut points = self.points.write().unwrap_or_else(PoisonError::into_inner);
        let before = points.len();
        points.retain(|_, point| point.board_id != board_id);
        let removed = before - points.len();
        info!(target: "fpg.control", board_id = %board_id, removed, "board_removed");
        removed
    }

    /// 查找绑定位置与目标重叠的点位。
    pub fn find_by_target(
        &self,
        protocol: &str,
        protocol_type: ProtocolType,
        target: &PointTarget,
    ) -> Option<Point> {
        self.points
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|point| {
                bound_target(point, protocol, protocol_type)
                    .is_some_and(|bound| bound.overlaps(target))
            })
            .cloned()
    }

    pub fn export_points(&self) -> Vec<Point> {
        self.list_points(None)
    }

    /// 逐条解析并校验导入，返回被拒绝条目的 id（缺失时为序号）与原因。
    pub fn import_points(&self, points: Vec<Value>) -> Vec<(String, GatewayError)> {
        let mut rejected = Vec::new();
        for (index, raw) in points.into_iter().enumerate() {
            let id = raw
                .get("id")
                .and_then(Value::as_str)
                .map_or_else(|| format!("#{}", index), str::to_string);
            if let Err(err) = decode_point(raw).and_then(|point| self.upsert_point(point)) {
                warn!(target: "fpg.control", point_id = %id, error = %err, "point_import_rejected");
                rejected.push((id, err));
            }
        }
        rejected
    }
}

/// 从 JSON 解析点位；未知的 `input_type` 报 `UnknownInputType`，其余结构错误报 `InvalidInput`。
pub fn decode_point(raw: Value) -> Result<Point, GatewayError> {
    if let Some(input_type) = raw.get("input_type").and_then(Value::as_str) {
        input_type.parse::<InputType>()?;
    }
    serde_json::from_value(raw)
        .map_err(|err| GatewayError::InvalidInput(format!("point: {}", err)))
}

/// 点位绑定在该协议上时按当前协议类型解析；协议类型变更后无法解析的绑定不参与比较。
fn bound_target(point: &Point, protocol: &str, protocol_type: ProtocolType) -> Option<PointTarget> {
    point
        .binding
        .as_ref()
        .filter(|binding| binding.protocol == protocol)
        .and_then(|binding| parse_target(protocol_type, &binding.device_id, &binding.address).ok())
}

fn not_found(point_id: &str) -> GatewayError {
    GatewayError::NotFound(format!("point `{}`", point_id))
}
