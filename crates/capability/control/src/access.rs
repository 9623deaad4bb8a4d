//! 现场点位读写
//!
//! 执行流程：
//! 1. 检查取消 / 截止时间
//! 2. 解析地址（格式错误在任何 I/O 之前返回 `InvalidAddress`）
//! 3. 排队获取协议租约（FIFO）
//! 4. 最多 `retry_count` 次尝试，每次受 `timeout_ms` 约束，尝试之间检查取消
//!
//! 写入额外经过检修联锁与点位启用检查（按解析后的目标匹配绑定），每个结果都写审计。

use crate::audit::{ACTION_POINT_WRITE, AuditTrail, RESULT_FAILED, RESULT_OK, RESULT_REFUSED};
use crate::catalog::PointCatalog;
use crate::maintenance::MaintenanceService;
use domain::{CallerContext, GatewayError, PointRef, PointValue, ProtocolType};
use fpg_protocol::{CallOptions, ConnectPolicy, ConnectionManager, PointTarget, parse_target};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

enum FieldOp<'a> {
    Read,
    Write {
        value: &'a PointValue,
        caller: &'a CallerContext,
    },
}

pub struct PointAccessService {
    manager: Arc<ConnectionManager>,
    catalog: Arc<PointCatalog>,
    maintenance: Arc<MaintenanceService>,
    audit: AuditTrail,
}

impl PointAccessService {
    pub fn new(
        manager: Arc<ConnectionManager>,
        catalog: Arc<PointCatalog>,
        maintenance: Arc<MaintenanceService>,
        audit: AuditTrail,
    ) -> Self {
        Self {
            manager,
            catalog,
            maintenance,
            audit,
        }
    }

    pub async fn read_point(
        &self,
        protocol: &str,
        device_id: &str,
        address: &str,
    ) -> Result<PointValue, GatewayError> {
        self.read_point_with(protocol, device_id, address, &CallOptions::default())
            .await
    }

    pub async fn read_point_with(
        &self,
        protocol: &str,
        device_id: &str,
        address: &str,
        options: &CallOptions,
    ) -> Result<PointValue, GatewayError> {
        let point = PointRef::new(protocol, device_id, address);
        let result = self
            .execute(&point, FieldOp::Read, options)
            .await
            .and_then(|value| {
                value.ok_or_else(|| GatewayError::Protocol {
                    point: point.clone(),
                    detail: "read returned no value".to_string(),
                })
            });
        fpg_telemetry::record_point_read(result.is_ok());
        match &result {
            Ok(value) => {
                debug!(target: "fpg.control", point = %point, value = %value, "point_read_completed");
            }
            Err(err) => {
                warn!(target: "fpg.control", point = %point, error = %err, code = err.code(), "point_read_failed");
            }
        }
        result
    }

    pub async fn write_point(
        &self,
        protocol: &str,
        device_id: &str,
        address: &str,
        value: PointValue,
        caller: &CallerContext,
    ) -> Result<(), GatewayError> {
        self.write_point_with(
            protocol,
            device_id,
            address,
            value,
            caller,
            &CallOptions::default(),
        )
        .await
    }

    pub async fn write_point_with(
        &self,
        protocol: &str,
        device_id: &str,
        address: &str,
        value: PointValue,
        caller: &CallerContext,
        options: &CallOptions,
    ) -> Result<(), GatewayError> {
        let point = PointRef::new(protocol, device_id, address);

        let result = if self.maintenance.blocks(caller).await {
            Err(locked(&point))
        } else {
            self.execute(
                &point,
                FieldOp::Write {
                    value: &value,
                    caller,
                },
                options,
            )
            .await
            .map(|_| ())
        };

        self.finish_write(&point, &value, caller, &result).await;
        result
    }

    async fn finish_write(
        &self,
        point: &PointRef,
        value: &PointValue,
        caller: &CallerContext,
        result: &Result<(), GatewayError>,
    ) {
        let (outcome, detail) = match result {
            Ok(()) => {
                fpg_telemetry::record_point_write(true);
                info!(
                    target: "fpg.control",
                    point = %point,
                    value = %value,
                    caller = caller.label(),
                    actor = %caller.actor(),
                    "point_write_completed"
                );
                (RESULT_OK, format!("value={}", value))
            }
            Err(err @ (GatewayError::MaintenanceLocked { .. } | GatewayError::Disabled(_))) => {
                fpg_telemetry::record_write_refused();
                warn!(
                    target: "fpg.control",
                    point = %point,
                    caller = caller.label(),
                    actor = %caller.actor(),
                    code = err.code(),
                    "point_write_refused"
                );
                (RESULT_REFUSED, err.to_string())
            }
            Err(err) => {
                fpg_telemetry::record_point_write(false);
                warn!(
                    target: "fpg.control",
                    point = %point,
                    caller = caller.label(),
                    error = %err,
                    code = err.code(),
                    "point_write_failed"
                );
                (RESULT_FAILED, err.to_string())
            }
        };
        self.audit
            .record(
                caller.actor(),
                caller.label(),
                ACTION_POINT_WRITE,
                point.to_string(),
                outcome,
                Some(detail),
            )
            .await;
    }

    /// 目标位置绑定了已停用的点位时拒绝写入。
    fn check_bound_point(
        &self,
        point: &PointRef,
        protocol_type: ProtocolType,
        target: &PointTarget,
    ) -> Result<(), GatewayError> {
        match self
            .catalog
            .find_by_target(&point.protocol, protocol_type, target)
        {
            Some(bound) if !bound.enabled => {
                Err(GatewayError::Disabled(format!("point `{}`", bound.id)))
            }
            _ => Ok(()),
        }
    }

    async fn execute(
        &self,
        point: &PointRef,
        op: FieldOp<'_>,
        options: &CallOptions,
    ) -> Result<Option<PointValue>, GatewayError> {
        options.check()?;
        let config = self.manager.registry().get(&point.protocol)?;
        if !config.enabled {
            return Err(GatewayError::Disabled(format!(
                "protocol `{}`",
                point.protocol
            )));
        }
        let target = parse_target(config.protocol_type, &point.device_id, &point.address)
            .map_err(|detail| GatewayError::InvalidAddress {
                point: point.clone(),
                detail,
            })?;
        if let FieldOp::Write { .. } = &op {
            self.check_bound_point(point, config.protocol_type, &target)?;
        }

        let mut lease = self
            .manager
            .acquire(&point.protocol, ConnectPolicy::Lazy)
            .await?;

        // 排队期间检修或点位停用可能已经生效
        if let FieldOp::Write { caller, .. } = &op {
            if self.maintenance.blocks(caller).await {
                return Err(locked(point));
            }
            self.check_bound_point(point, config.protocol_type, &target)?;
        }

        let attempts = lease.config().attempts();
        let timeout_ms = lease.config().timeout_ms;
        let mut last_error = None;
        for attempt in 1..=attempts {
            if attempt > 1 {
                options.check()?;
            }
            fpg_telemetry::record_field_attempt(attempt);

            let transport = match lease.ensure_connected().await {
                Ok(transport) => transport,
                Err(err) => {
                    if !err.is_retryable() || lease.status().exhausted {
                        return Err(err);
                    }
                    last_error = Some(err);
                    continue;
                }
            };

            let started = Instant::now();
            let outcome = tokio::time::timeout(lease.timeout(), async {
                match &op {
                    FieldOp::Read => transport.read(&target).await.map(Some),
                    FieldOp::Write { value, .. } => {
                        transport.write(&target, value).await.map(|()| None)
                    }
                }
            })
            .await;
            fpg_telemetry::record_field_latency_ms(started.elapsed().as_millis() as u64);

            let err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err.classify(point, timeout_ms),
                Err(_elapsed) => GatewayError::Timeout {
                    point: point.clone(),
                    timeout_ms,
                },
            };
            lease.record_failure(&err).await;
            debug!(
                target: "fpg.control",
                point = %point,
                target = %target,
                attempt,
                attempts,
                error = %err,
                "field_attempt_failed"
            );
            if !err.is_retryable() {
                return Err(err);
            }
            last_error = Some(err);
        }

        Err(last_error.unwrap_or_else(|| GatewayError::NotConnected(point.protocol.clone())))
    }
}

fn locked(point: &PointRef) -> GatewayError {
    GatewayError::MaintenanceLocked {
        point: point.to_string(),
    }
}
