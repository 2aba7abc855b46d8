//! 基于Redis的集群实现
//!
//! - 成员关系：有序集合 `{prefix}:members`，分值为最近一次心跳的毫秒时间戳，
//!   心跳在 `member_ttl` 内的节点视为存活
//! - 复制映射：哈希 `{prefix}:map:{name}`，字段为节点ID，值为JSON数组
//! - 分布式锁：`SET {prefix}:lock:{name} <node_id> NX PX <ttl>`，
//!   持有期间后台任务按租约的三分之一周期续期，解锁时用Lua脚本比较持有者后删除

use async_trait::async_trait;
use chrono::Utc;
use engine_core::config::ClusterConfig;
use engine_core::{EngineError, EngineResult};
use engine_domain::{ClusterMembership, DistributedLock, ReplicatedMap};
use redis::aio::ConnectionManager;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant};
use tracing::{debug, error, info, instrument, warn};

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

const UNLOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

const RENEW_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

pub struct RedisClusterMembership {
    connection: ConnectionManager,
    node_id: String,
    key_prefix: String,
    member_ttl: Duration,
}

impl RedisClusterMembership {
    /// 连接Redis并登记本节点
    pub async fn connect(config: &ClusterConfig, node_id: impl Into<String>) -> EngineResult<Self> {
        let url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| EngineError::Configuration("集群模式必须配置redis_url".to_string()))?;

        info!("Connecting to Redis cluster backend: {}", url);
        let client = redis::Client::open(url)?;
        let connection = client.get_connection_manager().await?;

        let membership = Self {
            connection,
            node_id: node_id.into(),
            key_prefix: config.key_prefix.clone(),
            member_ttl: Duration::from_secs(config.member_ttl_seconds),
        };
        membership.heartbeat().await?;

        info!("Node {} joined the cluster", membership.node_id);
        Ok(membership)
    }

    fn members_key(&self) -> String {
        format!("{}:members", self.key_prefix)
    }

    fn map_key(&self, name: &str) -> String {
        format!("{}:map:{}", self.key_prefix, name)
    }

    fn lock_key(&self, name: &str) -> String {
        format!("{}:lock:{}", self.key_prefix, name)
    }

    /// 刷新本节点的存活时间
    pub async fn heartbeat(&self) -> EngineResult<()> {
        let mut conn = self.connection.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(self.members_key())
            .arg(Utc::now().timestamp_millis())
            .arg(&self.node_id)
            .query_async(&mut conn)
            .await?;
        debug!("Heartbeat sent for node {}", self.node_id);
        Ok(())
    }

    /// 周期性发送心跳，直到收到关闭信号
    pub fn spawn_heartbeat(
        self: Arc<Self>,
        period: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.heartbeat().await {
                            error!("Failed to send cluster heartbeat: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Cluster heartbeat stopped for node {}", self.node_id);
                        break;
                    }
                }
            }
        })
    }

    /// 从成员集合中移除本节点
    pub async fn leave(&self) -> EngineResult<()> {
        let mut conn = self.connection.clone();
        let _: i64 = redis::cmd("ZREM")
            .arg(self.members_key())
            .arg(&self.node_id)
            .query_async(&mut conn)
            .await?;
        info!("Node {} left the cluster", self.node_id);
        Ok(())
    }
}

#[async_trait]
impl ClusterMembership for RedisClusterMembership {
    fn this_node_id(&self) -> &str {
        &self.node_id
    }

    #[instrument(skip(self))]
    async fn current_member_ids(&self) -> EngineResult<HashSet<String>> {
        let mut conn = self.connection.clone();
        let oldest_alive = Utc::now().timestamp_millis() - self.member_ttl.as_millis() as i64;
        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.members_key())
            .arg(oldest_alive)
            .arg("+inf")
            .query_async(&mut conn)
            .await?;
        Ok(members.into_iter().collect())
    }

    fn replicated_map(&self, name: &str) -> Arc<dyn ReplicatedMap> {
        Arc::new(RedisReplicatedMap {
            connection: self.connection.clone(),
            key: self.map_key(name),
        })
    }

    fn distributed_lock(&self, name: &str) -> Arc<dyn DistributedLock> {
        Arc::new(RedisLock {
            connection: self.connection.clone(),
            key: self.lock_key(name),
            holder: self.node_id.clone(),
            lease: self.member_ttl,
            watchdog: Mutex::new(None),
        })
    }
}

struct RedisReplicatedMap {
    connection: ConnectionManager,
    key: String,
}

#[async_trait]
impl ReplicatedMap for RedisReplicatedMap {
    async fn put(&self, key: &str, value: HashSet<String>) -> EngineResult<()> {
        let mut values: Vec<String> = value.into_iter().collect();
        values.sort();
        let payload = serde_json::to_string(&values)?;

        let mut conn = self.connection.clone();
        let _: i64 = redis::cmd("HSET")
            .arg(&self.key)
            .arg(key)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> EngineResult<()> {
        let mut conn = self.connection.clone();
        let _: i64 = redis::cmd("HDEL")
            .arg(&self.key)
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn entries(&self) -> EngineResult<HashMap<String, HashSet<String>>> {
        let mut conn = self.connection.clone();
        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(&self.key)
            .query_async(&mut conn)
            .await?;

        let mut entries = HashMap::with_capacity(raw.len());
        for (node_id, payload) in raw {
            match serde_json::from_str::<Vec<String>>(&payload) {
                Ok(values) => {
                    entries.insert(node_id, values.into_iter().collect());
                }
                Err(e) => warn!("Ignoring malformed entry for node {} in {}: {}", node_id, self.key, e),
            }
        }
        Ok(entries)
    }
}

struct RedisLock {
    connection: ConnectionManager,
    key: String,
    holder: String,
    /// 持有者崩溃时锁自动过期
    lease: Duration,
    /// 持有期间负责续期的后台任务
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl RedisLock {
    async fn try_acquire(&self) -> EngineResult<bool> {
        let mut conn = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(&self.key)
            .arg(&self.holder)
            .arg("NX")
            .arg("PX")
            .arg(self.lease.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        if reply.is_none() {
            return Ok(false);
        }

        let previous = self.watchdog.lock().await.replace(self.spawn_watchdog());
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(true)
    }

    /// 只要键仍由本节点持有就刷新过期时间，锁丢失后停止
    fn spawn_watchdog(&self) -> JoinHandle<()> {
        let mut conn = self.connection.clone();
        let key = self.key.clone();
        let holder = self.holder.clone();
        let lease_millis = self.lease.as_millis() as u64;
        let period = (self.lease / 3).max(Duration::from_millis(10));

        tokio::spawn(async move {
            let script = redis::Script::new(RENEW_SCRIPT);
            let mut ticker = interval(period);
            // 第一次tick立即返回，锁刚刚设置过租约
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let renewed: Result<i64, _> = script
                    .key(&key)
                    .arg(&holder)
                    .arg(lease_millis)
                    .invoke_async(&mut conn)
                    .await;
                match renewed {
                    Ok(1) => debug!("Renewed lease of lock {}", key),
                    Ok(_) => {
                        warn!("Lock {} is no longer held by node {}, stop renewing", key, holder);
                        break;
                    }
                    Err(e) => error!("Failed to renew lease of lock {}: {}", key, e),
                }
            }
        })
    }
}

#[async_trait]
impl DistributedLock for RedisLock {
    async fn lock(&self) -> EngineResult<()> {
        while !self.try_acquire().await? {
            sleep(LOCK_RETRY_INTERVAL).await;
        }
        Ok(())
    }

    async fn try_lock(&self, timeout: Duration) -> EngineResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_acquire().await? {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            sleep(LOCK_RETRY_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn unlock(&self) -> EngineResult<()> {
        if let Some(watchdog) = self.watchdog.lock().await.take() {
            watchdog.abort();
        }

        let mut conn = self.connection.clone();
        let released: i64 = redis::Script::new(UNLOCK_SCRIPT)
            .key(&self.key)
            .arg(&self.holder)
            .invoke_async(&mut conn)
            .await?;
        if released == 0 {
            return Err(EngineError::Cluster(format!(
                "锁 {} 不由节点 {} 持有",
                self.key, self.holder
            )));
        }
        Ok(())
    }
}

impl Drop for RedisLock {
    fn drop(&mut self) {
        if let Some(watchdog) = self.watchdog.get_mut().take() {
            watchdog.abort();
        }
    }
}
