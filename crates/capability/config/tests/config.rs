use fpg_config::{AppConfig, ThermistorProfile};

// 环境变量是进程级共享状态，所有断言放在同一个测试里顺序执行。
#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("FPG_HTTP_ADDR", "127.0.0.1:8081");
        std::env::set_var("FPG_SNAPSHOT_PATH", "/var/lib/fpg/gateway.json");
        std::env::set_var("FPG_DISCOVERY_WORKERS", "4");
        std::env::set_var("FPG_THERMISTOR", "pt1000");
        std::env::set_var("FPG_HARDWARE", "true");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8081");
    assert_eq!(
        config.snapshot_path.as_deref(),
        Some("/var/lib/fpg/gateway.json")
    );
    assert_eq!(config.discovery_workers, 4);
    assert_eq!(config.discovery_max_unit, 247);
    assert_eq!(config.discovery_deadline_ms, 600_000);
    assert_eq!(config.thermistor, ThermistorProfile::Pt1000);
    assert!(config.hardware_enabled);
    assert_eq!(config.megabas_bin, "megabas");

    unsafe {
        std::env::set_var("FPG_DISCOVERY_MAX_UNIT", "250");
    }
    assert!(AppConfig::from_env().is_err());

    unsafe {
        std::env::set_var("FPG_DISCOVERY_MAX_UNIT", "32");
        std::env::set_var("FPG_THERMISTOR", "ptc");
    }
    assert!(AppConfig::from_env().is_err());

    unsafe {
        std::env::remove_var("FPG_THERMISTOR");
        std::env::set_var("FPG_DISCOVERY_WORKERS", "0");
    }
    assert!(AppConfig::from_env().is_err());

    unsafe {
        std::env::set_var("FPG_DISCOVERY_WORKERS", "4");
        std::env::set_var("FPG_DISCOVERY_DEADLINE_MS", "0");
    }
    assert!(AppConfig::from_env().is_err());

    unsafe {
        std::env::set_var("FPG_DISCOVERY_DEADLINE_MS", "90000");
    }
    let config = AppConfig::from_env().expect("deadline");
    assert_eq!(config.discovery_deadline_ms, 90_000);
    assert_eq!(config.discovery_max_unit, 32);
}
