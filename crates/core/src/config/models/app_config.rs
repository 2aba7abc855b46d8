use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use super::{
    cluster::ClusterConfig,
    database::DatabaseConfig,
    engine::{CleaningConfig, QueueConfig, WorkersConfig},
    observability::ObservabilityConfig,
};

/// 环境变量前缀，例如 `COMPUTE_ENGINE__WORKERS__WORKER_COUNT=4`
pub const ENV_PREFIX: &str = "COMPUTE_ENGINE";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cluster: ClusterConfig,
    pub queue: QueueConfig,
    pub workers: WorkersConfig,
    pub cleaning: CleaningConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: COMPUTE_ENGINE__)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                debug!("加载配置文件: {}", path);
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/compute-engine.toml",
                "compute-engine.toml",
                "/etc/compute-engine/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                debug!("加载默认配置文件: {}", path);
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                debug!("未找到配置文件，使用默认配置和环境变量");
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.cluster.validate().context("集群配置验证失败")?;
        self.queue.validate().context("队列配置验证失败")?;
        self.workers.validate().context("Worker配置验证失败")?;
        self.cleaning.validate().context("清理任务配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.cluster.enabled);
        assert_eq!(config.workers.worker_count, 1);
    }

    #[test]
    fn test_from_toml_partial_sections_use_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [workers]
            worker_count = 4

            [queue]
            default_organization_uuid = "org-1"
            "#,
        )
        .unwrap();

        assert_eq!(config.workers.worker_count, 4);
        assert_eq!(config.queue.default_organization_uuid, "org-1");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.observability.log_format, "pretty");
    }

    #[test]
    fn test_cluster_requires_redis_url() {
        let result = AppConfig::from_toml(
            r#"
            [cluster]
            enabled = true
            "#,
        );
        assert!(result.is_err());

        let config = AppConfig::from_toml(
            r#"
            [cluster]
            enabled = true
            redis_url = "redis://localhost:6379"
            node_id = "node-a"
            "#,
        )
        .unwrap();
        assert_eq!(config.cluster.node_id.as_deref(), Some("node-a"));
    }

    #[test]
    fn test_heartbeat_must_be_shorter_than_ttl() {
        let result = AppConfig::from_toml(
            r#"
            [cluster]
            enabled = true
            redis_url = "redis://localhost:6379"
            member_ttl_seconds = 10
            heartbeat_interval_seconds = 10
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(AppConfig::from_toml("[workers]\nworker_count = 0\n").is_err());
        assert!(AppConfig::from_toml("[queue]\ndefault_organization_uuid = \" \"\n").is_err());
        assert!(AppConfig::from_toml("[observability]\nlog_format = \"xml\"\n").is_err());
        assert!(AppConfig::from_toml("[database]\nurl = \"postgres://x\"\n").is_err());
        assert!(AppConfig::from_toml(
            "[database]\nmax_connections = 1\nmin_connections = 2\n"
        )
        .is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [database]
            url = "sqlite::memory:"

            [cleaning]
            interval_seconds = 30
            lock_wait_millis = 250
            "#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.cleaning.interval_seconds, 30);
        assert_eq!(config.cleaning.lock_wait_millis, 250);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/definitely/not/here.toml")).is_err());
    }

    #[test]
    fn test_toml_roundtrip_keeps_values() {
        let mut config = AppConfig::default();
        config.workers.worker_count = 3;
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.workers.worker_count, 3);
    }
}
