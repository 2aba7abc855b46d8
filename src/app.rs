use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use engine_core::{AppConfig, EngineResult};
use engine_dispatcher::{
    CleaningJob, ClusteredWorkerRegistry, DistributedWorkerRegistry, StandaloneWorkerRegistry,
    TaskQueue,
};
use engine_domain::{ClusterMembership, TaskStore, WorkerUuidsProvider};
use engine_infrastructure::{DatabaseManager, RedisClusterMembership, SqliteTaskStore};
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::lifecycle::ComputeEngineContainer;
use crate::shutdown::ShutdownManager;
use crate::workers::WorkerPool;

/// 计算引擎容器：持有任务队列、Worker池、Worker注册表和后台任务
pub struct EngineContainer {
    config: AppConfig,
    node_id: String,
    database: DatabaseManager,
    queue: Arc<TaskQueue>,
    workers: Arc<WorkerPool>,
    registry: Arc<dyn DistributedWorkerRegistry>,
    cleaning_job: Arc<CleaningJob>,
    /// 只有Redis集群需要心跳和主动离开
    redis: Option<Arc<RedisClusterMembership>>,
    shutdown: ShutdownManager,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl EngineContainer {
    /// 根据配置连接数据库，集群模式下同时连接Redis
    pub async fn build(config: AppConfig) -> Result<Self> {
        let node_id = resolve_node_id(&config);
        info!("初始化计算引擎容器，节点: {}", node_id);

        let database = DatabaseManager::new(&config.database)
            .await
            .with_context(|| format!("连接数据库失败: {}", config.database.url))?;

        if !config.cluster.enabled {
            return Ok(Self::assemble(config, node_id, database, None, None));
        }

        let redis = RedisClusterMembership::connect(&config.cluster, node_id.clone())
            .await
            .context("加入计算引擎集群失败")?;
        let redis = Arc::new(redis);
        let membership: Arc<dyn ClusterMembership> = redis.clone();

        Ok(Self::assemble(
            config,
            node_id,
            database,
            Some(membership),
            Some(redis),
        ))
    }

    /// 使用已有的数据库和集群成员关系组装容器
    ///
    /// `membership` 为 `None` 时以单节点模式运行。
    pub fn new(
        config: AppConfig,
        database: DatabaseManager,
        membership: Option<Arc<dyn ClusterMembership>>,
    ) -> Self {
        let node_id = match &membership {
            Some(membership) => membership.this_node_id().to_string(),
            None => resolve_node_id(&config),
        };
        Self::assemble(config, node_id, database, membership, None)
    }

    fn assemble(
        config: AppConfig,
        node_id: String,
        database: DatabaseManager,
        membership: Option<Arc<dyn ClusterMembership>>,
        redis: Option<Arc<RedisClusterMembership>>,
    ) -> Self {
        let store: Arc<dyn TaskStore> = Arc::new(SqliteTaskStore::new(database.pool().clone()));
        let queue = Arc::new(TaskQueue::new(
            store,
            config.queue.default_organization_uuid.clone(),
        ));

        let workers = Arc::new(WorkerPool::new(config.workers.worker_count));
        let provider: Arc<dyn WorkerUuidsProvider> = workers.clone();
        let registry: Arc<dyn DistributedWorkerRegistry> = match membership {
            Some(membership) => Arc::new(ClusteredWorkerRegistry::new(membership, provider)),
            None => Arc::new(StandaloneWorkerRegistry::new(provider)),
        };

        let cleaning_job = Arc::new(CleaningJob::new(
            Arc::clone(&queue),
            Arc::clone(&registry),
            Duration::from_millis(config.cleaning.lock_wait_millis),
        ));

        Self {
            config,
            node_id,
            database,
            queue,
            workers,
            registry,
            cleaning_job,
            redis,
            shutdown: ShutdownManager::new(),
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn queue(&self) -> Arc<TaskQueue> {
        Arc::clone(&self.queue)
    }

    pub fn registry(&self) -> Arc<dyn DistributedWorkerRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn workers(&self) -> Arc<WorkerPool> {
        Arc::clone(&self.workers)
    }

    pub fn cleaning_job(&self) -> Arc<CleaningJob> {
        Arc::clone(&self.cleaning_job)
    }

    async fn spawn_cleaning_loop(&self) -> JoinHandle<()> {
        let job = Arc::clone(&self.cleaning_job);
        let start = Instant::now() + Duration::from_secs(self.config.cleaning.initial_delay_seconds);
        let period = Duration::from_secs(self.config.cleaning.interval_seconds);
        let mut shutdown_rx = self.shutdown.subscribe().await;

        tokio::spawn(async move {
            let mut ticker = interval_at(start, period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = job.run_once().await {
                            error!("队列清理失败: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("队列清理任务已停止");
                        break;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl ComputeEngineContainer for EngineContainer {
    async fn start(&self) -> EngineResult<()> {
        self.database.migrate().await?;

        self.workers.start();
        self.registry.broadcast_worker_uuids().await?;

        let mut background = self.background.lock().await;
        if let Some(redis) = &self.redis {
            let period = Duration::from_secs(self.config.cluster.heartbeat_interval_seconds);
            let shutdown_rx = self.shutdown.subscribe().await;
            background.push(Arc::clone(redis).spawn_heartbeat(period, shutdown_rx));
        }
        if self.config.cleaning.enabled {
            background.push(self.spawn_cleaning_loop().await);
        }

        info!(
            "计算引擎容器已启动: 节点 {}, {} 个Worker",
            self.node_id,
            self.workers.worker_count()
        );
        Ok(())
    }

    async fn stop_workers(&self) -> EngineResult<()> {
        self.workers.stop();
        // 让其他节点不再把本节点的Worker视为存活
        self.registry.broadcast_worker_uuids().await
    }

    async fn stop(&self) -> EngineResult<()> {
        self.shutdown.shutdown().await;

        let handles = std::mem::take(&mut *self.background.lock().await);
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!("后台任务异常退出: {}", e);
            }
        }

        self.workers.stop();
        self.registry.stop().await?;

        if let Some(redis) = &self.redis {
            if let Err(e) = redis.leave().await {
                warn!("离开计算引擎集群失败: {}", e);
            }
        }

        self.database.close().await;
        info!("计算引擎容器已停止: 节点 {}", self.node_id);
        Ok(())
    }
}

/// 配置中未指定节点ID时，使用主机名加随机后缀
fn resolve_node_id(config: &AppConfig) -> String {
    if let Some(node_id) = &config.cluster.node_id {
        return node_id.clone();
    }

    let host = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "compute-engine".to_string());
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", host, &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_node_id_wins() {
        let mut config = AppConfig::default();
        config.cluster.node_id = Some("node-a".to_string());
        assert_eq!(resolve_node_id(&config), "node-a");
    }

    #[test]
    fn test_generated_node_ids_are_unique() {
        let config = AppConfig::default();
        let first = resolve_node_id(&config);
        let second = resolve_node_id(&config);
        assert_ne!(first, second);
    }
}
