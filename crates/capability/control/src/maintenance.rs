//! 检修联锁
//!
//! ```text
//! Inactive --enable--> Active --disable--> Inactive
//! Active --now >= started_at + duration--> Inactive（在任意状态读取 / 写入检查时惰性转换）
//! ```
//!
//! 状态读取是 `ArcSwap` 无锁快照；启用、停用、到期转换持有同一把写锁。

use crate::audit::{
    ACTION_MAINTENANCE_DISABLE, ACTION_MAINTENANCE_ENABLE, ACTION_MAINTENANCE_EXPIRE, AuditTrail,
    RESULT_FAILED, RESULT_OK,
};
use crate::clock::Clock;
use arc_swap::ArcSwap;
use domain::{CallerContext, GatewayError};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

pub const MIN_DURATION_MINUTES: u32 = 1;
pub const MAX_DURATION_MINUTES: u32 = 120;
/// 默认历史记录保留条数
pub const HISTORY_LIMIT: usize = 100;

const MINUTE_MS: i64 = 60_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaintenanceState {
    pub enabled: bool,
    pub started_at_ms: Option<i64>,
    pub duration_minutes: u32,
    pub reason: String,
    pub authorized_by: String,
}

impl MaintenanceState {
    fn expires_at_ms(&self) -> Option<i64> {
        self.started_at_ms
            .map(|started| started + i64::from(self.duration_minutes) * MINUTE_MS)
    }
}

/// 状态查询结果，附带剩余时间（供运维倒计时显示）。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaintenanceStatus {
    #[serde(flatten)]
    pub state: MaintenanceState,
    pub remaining_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceAction {
    Enabled,
    Disabled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaintenanceLogEntry {
    pub ts_ms: i64,
    pub action: MaintenanceAction,
    pub actor: String,
    pub details: String,
}

pub struct MaintenanceInterlock {
    state: ArcSwap<MaintenanceState>,
    history: Mutex<VecDeque<MaintenanceLogEntry>>,
    history_limit: usize,
    clock: Arc<dyn Clock>,
}

impl MaintenanceInterlock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: ArcSwap::from_pointee(MaintenanceState::default()),
            history: Mutex::new(VecDeque::new()),
            history_limit: HISTORY_LIMIT,
            clock,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    fn push_entry(&self, history: &mut VecDeque<MaintenanceLogEntry>, entry: MaintenanceLogEntry) {
        history.push_front(entry);
        history.truncate(self.history_limit);
    }

    fn is_expired(&self, state: &MaintenanceState) -> bool {
        state.enabled
            && state
                .expires_at_ms()
                .is_none_or(|expires| self.clock.now_ms() >= expires)
    }

    /// 到期则转换为停用并返回到期前的状态。
    pub fn poll_expiry(&self) -> Option<MaintenanceState> {
        if !self.is_expired(&self.state.load()) {
            return None;
        }
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        // 持锁后复查，避免与并发的停用 / 到期重复转换
        let current = self.state.load_full();
        if !self.is_expired(&current) {
            return None;
        }
        self.state.store(Arc::new(MaintenanceState::default()));
        self.push_entry(
            &mut history,
            MaintenanceLogEntry {
                ts_ms: self.clock.now_ms(),
                action: MaintenanceAction::Expired,
                actor: "system".to_string(),
                details: format!(
                    "expired after {} minute(s): {}",
                    current.duration_minutes, current.reason
                ),
            },
        );
        fpg_telemetry::record_maintenance_transition();
        info!(target: "fpg.control", reason = %current.reason, "maintenance_expired");
        Some(current.as_ref().clone())
    }

    pub fn status(&self) -> MaintenanceStatus {
        self.poll_expiry();
        let state = self.state.load_full().as_ref().clone();
        let remaining_ms = state
            .expires_at_ms()
            .filter(|_| state.enabled)
            .map(|expires| (expires - self.clock.now_ms()).max(0));
        MaintenanceStatus {
            state,
            remaining_ms,
        }
    }

    /// 惰性到期后是否处于检修状态。
    pub fn is_active(&self) -> bool {
        self.poll_expiry();
        self.state.load().enabled
    }

    pub fn enable(
        &self,
        reason: &str,
        authorized_by: &str,
        duration_minutes: u32,
    ) -> Result<MaintenanceState, GatewayError> {
        let reason = reason.trim();
        let authorized_by = authorized_by.trim();
        if reason.is_empty() {
            return Err(GatewayError::InvalidInput("reason is required".to_string()));
        }
        if authorized_by.is_empty() {
            return Err(GatewayError::InvalidInput(
                "authorized_by is required".to_string(),
            ));
        }
        if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration_minutes) {
            return Err(GatewayError::InvalidInput(format!(
                "duration_minutes must be within {}..={}, got {}",
                MIN_DURATION_MINUTES, MAX_DURATION_MINUTES, duration_minutes
            )));
        }

        self.poll_expiry();
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if self.state.load().enabled {
            return Err(GatewayError::AlreadyActive);
        }
        let now = self.clock.now_ms();
        let state = MaintenanceState {
            enabled: true,
            started_at_ms: Some(now),
            duration_minutes,
            reason: reason.to_string(),
            authorized_by: authorized_by.to_string(),
        };
        self.state.store(Arc::new(state.clone()));
        self.push_entry(
            &mut history,
            MaintenanceLogEntry {
                ts_ms: now,
                action: MaintenanceAction::Enabled,
                actor: authorized_by.to_string(),
                details: format!("{} minute(s): {}", duration_minutes, reason),
            },
        );
        fpg_telemetry::record_maintenance_transition();
        info!(
            target: "fpg.control",
            authorized_by = %authorized_by,
            duration_minutes,
            "maintenance_enabled"
        );
        Ok(state)
    }

    /// 返回停用前的状态；未启用时为空操作。
    pub fn disable(&self, actor: &str) -> MaintenanceState {
        self.poll_expiry();
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let prior = self.state.load_full();
        if !prior.enabled {
            return prior.as_ref().clone();
        }
        self.state.store(Arc::new(MaintenanceState::default()));
        self.push_entry(
            &mut history,
            MaintenanceLogEntry {
                ts_ms: self.clock.now_ms(),
                action: MaintenanceAction::Disabled,
                actor: actor.to_string(),
                details: prior.reason.clone(),
            },
        );
        fpg_telemetry::record_maintenance_transition();
        info!(target: "fpg.control", actor = %actor, "maintenance_disabled");
        prior.as_ref().clone()
    }

    /// 最新在前。
    pub fn history(&self) -> Vec<MaintenanceLogEntry> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// 检修服务：联锁状态转换 + 审计。
pub struct MaintenanceService {
    interlock: Arc<MaintenanceInterlock>,
    audit: AuditTrail,
}

impl MaintenanceService {
    pub fn new(interlock: Arc<MaintenanceInterlock>, audit: AuditTrail) -> Self {
        Self { interlock, audit }
    }

    pub fn interlock(&self) -> &Arc<MaintenanceInterlock> {
        &self.interlock
    }

    /// 检查到期；发生到期转换时写审计。
    async fn observe_expiry(&self) {
        if let Some(prior) = self.interlock.poll_expiry() {
            self.audit
                .record(
                    "system",
                    "system",
                    ACTION_MAINTENANCE_EXPIRE,
                    "maintenance".to_string(),
                    RESULT_OK,
                    Some(prior.reason),
                )
                .await;
        }
    }

    pub async fn get_maintenance_status(&self) -> MaintenanceStatus {
        self.observe_expiry().await;
        self.interlock.status()
    }

    pub async fn enable_maintenance_mode(
        &self,
        reason: &str,
        authorized_by: &str,
        duration_minutes: u32,
    ) -> Result<MaintenanceState, GatewayError> {
        self.observe_expiry().await;
        let result = self
            .interlock
            .enable(reason, authorized_by, duration_minutes);
        let (outcome, detail) = match &result {
            Ok(state) => (
                RESULT_OK,
                format!("{} minute(s): {}", state.duration_minutes, state.reason),
            ),
            Err(err) => {
                warn!(target: "fpg.control", authorized_by = %authorized_by, error = %err, "maintenance_enable_rejected");
                (RESULT_FAILED, err.to_string())
            }
        };
        self.audit
            .record(
                authorized_by,
                "manual",
                ACTION_MAINTENANCE_ENABLE,
                "maintenance".to_string(),
                outcome,
                Some(detail),
            )
            .await;
        result
    }

    pub async fn disable_maintenance_mode(&self, actor: &str) -> MaintenanceState {
        self.observe_expiry().await;
        let prior = self.interlock.disable(actor);
        if prior.enabled {
            self.audit
                .record(
                    actor,
                    "manual",
                    ACTION_MAINTENANCE_DISABLE,
                    "maintenance".to_string(),
                    RESULT_OK,
                    Some(prior.reason.clone()),
                )
                .await;
        }
        prior
    }

    pub async fn maintenance_history(&self) -> Vec<MaintenanceLogEntry> {
        self.observe_expiry().await;
        self.interlock.history()
    }

    /// 自动调用方在检修期间被拦截；人工调用方始终放行。
    pub async fn blocks(&self, caller: &CallerContext) -> bool {
        if !caller.is_automatic() {
            return false;
        }
        self.observe_expiry().await;
        self.interlock.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn interlock() -> (Arc<ManualClock>, MaintenanceInterlock) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let interlock = MaintenanceInterlock::new(clock.clone());
        (clock, interlock)
    }

    #[test]
    fn duration_bounds() {
        let (_, interlock) = interlock();
        assert!(matches!(
            interlock.enable("valve swap", "tech", 150),
            Err(GatewayError::InvalidInput(_))
        ));
        assert!(matches!(
            interlock.enable("valve swap", "tech", 0),
            Err(GatewayError::InvalidInput(_))
        ));
        let state = interlock.enable("valve swap", "tech", 120).expect("enable");
        assert!(state.enabled);
        assert_eq!(state.started_at_ms, Some(1_000_000));
    }

    #[test]
    fn blank_fields_rejected() {
        let (_, interlock) = interlock();
        assert!(interlock.enable("   ", "tech", 10).is_err());
        assert!(interlock.enable("reason", " ", 10).is_err());
        assert!(!interlock.is_active());
    }

    #[test]
    fn second_enable_is_already_active() {
        let (_, interlock) = interlock();
        interlock.enable("filter change", "tech", 30).expect("enable");
        assert_eq!(
            interlock.enable("filter change", "tech", 30),
            Err(GatewayError::AlreadyActive)
        );
    }

    #[test]
    fn expiry_is_lazy_and_logged() {
        let (clock, interlock) = interlock();
        interlock.enable("pump", "tech", 1).expect("enable");
        clock.advance(Duration::from_secs(59));
        let status = interlock.status();
        assert!(status.state.enabled);
        assert_eq!(status.remaining_ms, Some(1_000));

        clock.advance(Duration::from_secs(1));
        let status = interlock.status();
        assert!(!status.state.enabled);
        assert_eq!(status.state.started_at_ms, None);
        assert_eq!(status.remaining_ms, None);

        let history = interlock.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, MaintenanceAction::Expired);
        assert_eq!(history[1].action, MaintenanceAction::Enabled);
    }

    #[test]
    fn disable_returns_prior_state() {
        let (_, interlock) = interlock();
        let prior = interlock.disable("tech");
        assert!(!prior.enabled);
        assert!(interlock.history().is_empty());

        interlock.enable("coil clean", "tech", 15).expect("enable");
        let prior = interlock.disable("lead");
        assert!(prior.enabled);
        assert_eq!(prior.reason, "coil clean");
        assert!(!interlock.is_active());
        assert_eq!(interlock.history()[0].actor, "lead");
    }

    #[test]
    fn history_is_bounded() {
        let (_, interlock) = interlock();
        for _ in 0..(HISTORY_LIMIT + 10) {
            interlock.enable("cycle", "tech", 5).expect("enable");
            interlock.disable("tech");
        }
        assert_eq!(interlock.history().len(), HISTORY_LIMIT);
    }
}
