use engine_core::config::AppConfig;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_missing_config_file_is_an_error() {
    let result = AppConfig::load(Some("/nonexistent/compute-engine.toml"));
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("配置文件不存在"));
}

// 环境变量对整个进程可见，覆盖相关的断言放在同一个测试里
#[test]
fn test_environment_overrides_file_values() {
    let file = write_config(
        r#"
[database]
url = "sqlite::memory:"

[workers]
worker_count = 2

[queue]
default_organization_uuid = "org-from-file"
"#,
    );

    env::set_var("COMPUTE_ENGINE__WORKERS__WORKER_COUNT", "6");
    env::set_var("COMPUTE_ENGINE__CLEANING__ENABLED", "false");
    let config = AppConfig::load(file.path().to_str());
    env::remove_var("COMPUTE_ENGINE__WORKERS__WORKER_COUNT");
    env::remove_var("COMPUTE_ENGINE__CLEANING__ENABLED");

    let config = config.unwrap();
    assert_eq!(config.workers.worker_count, 6);
    assert!(!config.cleaning.enabled);
    assert_eq!(config.queue.default_organization_uuid, "org-from-file");
    assert_eq!(config.database.url, "sqlite::memory:");
}

#[test]
fn test_serialized_config_loads_back() {
    let mut config = AppConfig::default();
    config.cluster.key_prefix = "ce-test".to_string();
    config.cleaning.lock_wait_millis = 500;

    let file = write_config(&config.to_toml().unwrap());
    let loaded = AppConfig::load(file.path().to_str()).unwrap();

    assert_eq!(loaded.cluster.key_prefix, "ce-test");
    assert_eq!(loaded.cleaning.lock_wait_millis, 500);
}
