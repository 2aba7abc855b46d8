use serde::{Deserialize, Serialize};

/// 任务队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 组件无法解析时任务所属的默认组织
    pub default_organization_uuid: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_organization_uuid: "default-organization".to_string(),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_organization_uuid.trim().is_empty() {
            return Err(anyhow::anyhow!("默认组织UUID不能为空"));
        }
        Ok(())
    }
}

/// Worker池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub worker_count: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self { worker_count: 1 }
    }
}

impl WorkersConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_count == 0 {
            return Err(anyhow::anyhow!("Worker数量必须大于0"));
        }
        Ok(())
    }
}

/// 队列清理任务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub enabled: bool,
    pub initial_delay_seconds: u64,
    pub interval_seconds: u64,
    /// 获取集群锁时的最长等待时间
    pub lock_wait_millis: u64,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_seconds: 0,
            interval_seconds: 600,
            lock_wait_millis: 0,
        }
    }
}

impl CleaningConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.enabled && self.interval_seconds == 0 {
            return Err(anyhow::anyhow!("清理间隔必须大于0"));
        }
        Ok(())
    }
}
