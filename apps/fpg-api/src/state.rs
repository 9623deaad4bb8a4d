//! 应用状态装配
//!
//! 所有服务都是 `Arc` 共享的，`AppState` 可以廉价克隆给每个 handler。

use fpg_config::{AppConfig, ThermistorProfile};
use fpg_control::{
    AuditTrail, Clock, HardwareDriver, LocalPointService, MaintenanceInterlock,
    MaintenanceService, MegabasCliDriver, PointAccessService, PointCatalog, SimulatedDriver,
    SystemClock,
};
use fpg_normalize::{Rtd, ScalingEngine, SteinhartHart, TemperatureConverter};
use fpg_protocol::{
    ConnectionManager, DefaultTransportFactory, DiscoveryService, SerialPortLister,
    SystemSerialPorts, TransportFactory,
};
use fpg_storage::{
    AuditLogStore, GatewaySnapshot, InMemoryAuditLogStore, JsonFileSnapshotStore, SnapshotStore,
    StorageError,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 组装参数；生产环境由 [`StateOptions::from_config`] 生成，测试中替换传输与驱动。
pub struct StateOptions {
    pub factory: Arc<dyn TransportFactory>,
    pub serial_ports: Arc<dyn SerialPortLister>,
    pub driver: Arc<dyn HardwareDriver>,
    pub clock: Arc<dyn Clock>,
    pub snapshot_store: Option<Arc<dyn SnapshotStore>>,
    pub scaling: ScalingEngine,
    pub discovery_workers: usize,
    pub discovery_max_unit: u8,
    pub discovery_deadline: Duration,
    pub audit_capacity: usize,
    pub maintenance_history_limit: usize,
}

impl StateOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        let driver: Arc<dyn HardwareDriver> = if config.hardware_enabled {
            Arc::new(MegabasCliDriver::new(
                config.megabas_bin.clone(),
                config.relay8_bin.clone(),
                config.relay16_bin.clone(),
            ))
        } else {
            Arc::new(SimulatedDriver::new())
        };
        let snapshot_store = config
            .snapshot_path
            .as_ref()
            .map(|path| Arc::new(JsonFileSnapshotStore::new(path)) as Arc<dyn SnapshotStore>);
        Self {
            factory: Arc::new(DefaultTransportFactory),
            serial_ports: Arc::new(SystemSerialPorts),
            driver,
            clock: Arc::new(SystemClock),
            snapshot_store,
            scaling: ScalingEngine::with_converter(converter(config.thermistor)),
            discovery_workers: config.discovery_workers,
            discovery_max_unit: config.discovery_max_unit,
            discovery_deadline: Duration::from_millis(config.discovery_deadline_ms),
            audit_capacity: config.audit_capacity,
            maintenance_history_limit: config.maintenance_history_limit,
        }
    }
}

fn converter(profile: ThermistorProfile) -> Arc<dyn TemperatureConverter> {
    match profile {
        ThermistorProfile::Ntc10kType2 => Arc::new(SteinhartHart::ntc_10k_type2()),
        ThermistorProfile::Ntc10kType3 => Arc::new(SteinhartHart::ntc_10k_type3()),
        ThermistorProfile::Pt100 => Arc::new(Rtd::pt100()),
        ThermistorProfile::Pt1000 => Arc::new(Rtd::pt1000()),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConnectionManager>,
    pub discovery: Arc<DiscoveryService>,
    pub access: Arc<PointAccessService>,
    pub local: Arc<LocalPointService>,
    pub maintenance: Arc<MaintenanceService>,
    pub catalog: Arc<PointCatalog>,
    pub audit_log_store: Arc<dyn AuditLogStore>,
    pub snapshot_store: Option<Arc<dyn SnapshotStore>>,
}

impl AppState {
    pub fn new(options: StateOptions) -> Self {
        let manager = Arc::new(
            ConnectionManager::new(options.factory).with_serial_ports(options.serial_ports),
        );
        let discovery = Arc::new(
            DiscoveryService::new(manager.clone())
                .with_limits(options.discovery_workers, options.discovery_max_unit)
                .with_deadline(options.discovery_deadline),
        );
        let catalog = Arc::new(PointCatalog::new(manager.registry().clone()));
        let audit_log_store: Arc<dyn AuditLogStore> =
            Arc::new(InMemoryAuditLogStore::with_capacity(options.audit_capacity));
        let audit = AuditTrail::new(audit_log_store.clone(), options.clock.clone());
        let interlock = MaintenanceInterlock::new(options.clock)
            .with_history_limit(options.maintenance_history_limit);
        let maintenance = Arc::new(MaintenanceService::new(Arc::new(interlock), audit.clone()));
        let access = Arc::new(PointAccessService::new(
            manager.clone(),
            catalog.clone(),
            maintenance.clone(),
            audit.clone(),
        ));
        let local = Arc::new(LocalPointService::new(
            catalog.clone(),
            options.driver,
            options.scaling,
            maintenance.clone(),
            audit,
        ));
        Self {
            manager,
            discovery,
            access,
            local,
            maintenance,
            catalog,
            audit_log_store,
            snapshot_store: options.snapshot_store,
        }
    }

    /// 当前协议与点位配置。
    pub fn snapshot(&self) -> GatewaySnapshot {
        GatewaySnapshot::new(self.manager.export_protocols(), self.catalog.export_points())
    }

    /// 启动时恢复配置；逐条校验，被拒绝的条目只记日志。
    pub async fn restore(&self) -> Result<(), StorageError> {
        let Some(store) = &self.snapshot_store else {
            return Ok(());
        };
        let Some(snapshot) = store.load().await? else {
            info!(target: "fpg.api", "snapshot_not_found");
            return Ok(());
        };
        let protocols = snapshot.protocols.len();
        let points = snapshot.points.len();
        let rejected_protocols = self.manager.import_protocols(snapshot.protocols);
        let rejected_points = self.catalog.import_points(snapshot.points);
        if !rejected_protocols.is_empty() || !rejected_points.is_empty() {
            warn!(
                target: "fpg.api",
                rejected_protocols = rejected_protocols.len(),
                rejected_points = rejected_points.len(),
                "snapshot_partially_restored"
            );
        }
        info!(target: "fpg.api", protocols, points, "snapshot_restored");
        Ok(())
    }

    /// 保存当前配置；未配置快照存储时返回 false。
    pub async fn persist(&self) -> Result<bool, StorageError> {
        let Some(store) = &self.snapshot_store else {
            return Ok(false);
        };
        let snapshot = self.snapshot();
        store.save(&snapshot).await?;
        info!(
            target: "fpg.api",
            protocols = snapshot.protocols.len(),
            points = snapshot.points.len(),
            "snapshot_saved"
        );
        Ok(true)
    }
}
