//! 配置模块集成测试
//!
//! 从文件加载配置并构造 Gatekeeper

use std::io::Write;
use tokio_test::{assert_err, assert_ok};
use tiergate::{
    config::{GateConfig, StorageBackend},
    error::GateError,
    factory::StoreFactory,
    fallback::FallbackStrategy,
};

/// 测试从 YAML 文件构造 Gatekeeper
#[tokio::test]
async fn test_gatekeeper_from_yaml_file() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(
        file,
        "storage: memory\nfallback: fail_closed\nsweep_interval_secs: 5\n"
    )
    .unwrap();

    let config = GateConfig::from_file(file.path()).unwrap();
    assert_eq!(config.storage, StorageBackend::Memory);
    assert_eq!(config.fallback, FallbackStrategy::FailClosed);

    let gate = StoreFactory::gatekeeper(&config).await.unwrap().build();
    assert_eq!(gate.backend_name(), "memory");
    assert_eq!(gate.fallback().strategy(), FallbackStrategy::FailClosed);
}

/// 测试环境变量覆盖文件配置
#[tokio::test]
async fn test_env_overrides_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "storage = \"memory\"\nfallback = \"fail_open\"").unwrap();

    let mut config = GateConfig::from_file(file.path()).unwrap();
    config
        .apply_env_from(|name| match name {
            "TIERGATE_FALLBACK" => Some("closed".to_string()),
            _ => None,
        })
        .unwrap();
    assert_eq!(config.fallback, FallbackStrategy::FailClosed);
    assert_ok!(config.validate());

    config.sweep_interval_secs = 0;
    assert_err!(config.validate());
}

/// 测试不支持的文件格式
#[test]
fn test_unsupported_extension() {
    let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
    assert!(matches!(
        GateConfig::from_file(file.path()),
        Err(GateError::ConfigError(_))
    ));
}

/// 测试文件不存在
#[test]
fn test_missing_file() {
    assert!(matches!(
        GateConfig::from_file("/nonexistent/tiergate.toml"),
        Err(GateError::IoError(_))
    ));
}
