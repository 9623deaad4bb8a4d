//! 现场点位网关入口：加载配置、恢复快照、启动 HTTP 服务。

use fpg_api::{AppState, StateOptions, app};
use fpg_config::AppConfig;
use fpg_telemetry::init_tracing;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    let state = AppState::new(StateOptions::from_config(&config));
    state.restore().await?;

    // 设备列表更新只记日志，供运维排查
    let mut device_events = state.manager.subscribe_devices();
    tokio::spawn(async move {
        loop {
            match device_events.recv().await {
                Ok(event) => info!(
                    target: "fpg.api",
                    protocol = %event.protocol,
                    devices = event.devices.len(),
                    "device_list_updated"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "fpg.api", skipped, "device_events_lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(
        target: "fpg.api",
        addr = %config.http_addr,
        hardware = config.hardware_enabled,
        snapshot = ?config.snapshot_path,
        "http_listening"
    );
    axum::serve(listener, app(state)).await?;
    Ok(())
}
