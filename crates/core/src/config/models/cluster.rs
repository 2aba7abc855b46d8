use serde::{Deserialize, Serialize};

/// 集群配置
///
/// `enabled = false` 时引擎以单节点模式运行，Worker注册表使用本地实现。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub enabled: bool,
    /// 本节点ID，未配置时由主机名加随机后缀生成
    pub node_id: Option<String>,
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub member_ttl_seconds: u64,
    pub heartbeat_interval_seconds: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            node_id: None,
            redis_url: None,
            key_prefix: "ce".to_string(),
            member_ttl_seconds: 30,
            heartbeat_interval_seconds: 10,
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(node_id) = &self.node_id {
            if node_id.trim().is_empty() {
                return Err(anyhow::anyhow!("节点ID不能为空字符串"));
            }
        }

        if !self.enabled {
            return Ok(());
        }

        match &self.redis_url {
            Some(url) if url.starts_with("redis://") || url.starts_with("rediss://") => {}
            Some(url) => return Err(anyhow::anyhow!("Redis URL格式无效: {url}")),
            None => return Err(anyhow::anyhow!("集群模式必须配置redis_url")),
        }

        if self.key_prefix.is_empty() {
            return Err(anyhow::anyhow!("键前缀不能为空"));
        }

        if self.heartbeat_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }

        if self.heartbeat_interval_seconds >= self.member_ttl_seconds {
            return Err(anyhow::anyhow!(
                "心跳间隔({}s)必须小于成员过期时间({}s)",
                self.heartbeat_interval_seconds,
                self.member_ttl_seconds
            ));
        }

        Ok(())
    }
}
