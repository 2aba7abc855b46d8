use async_trait::async_trait;
use engine_core::{EngineError, EngineResult};
use engine_domain::{DistributedLock, WorkerUuidsProvider};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::DistributedWorkerRegistry;

/// 单节点实现：Worker UUID缓存在本地，清理任务锁总是立即获得
pub struct StandaloneWorkerRegistry {
    workers: Arc<dyn WorkerUuidsProvider>,
    worker_uuids: RwLock<Option<HashSet<String>>>,
}

impl StandaloneWorkerRegistry {
    pub fn new(workers: Arc<dyn WorkerUuidsProvider>) -> Self {
        Self {
            workers,
            worker_uuids: RwLock::new(None),
        }
    }
}

#[async_trait]
impl DistributedWorkerRegistry for StandaloneWorkerRegistry {
    async fn get_worker_uuids(&self) -> EngineResult<HashSet<String>> {
        self.worker_uuids
            .read()
            .await
            .clone()
            .ok_or(EngineError::WorkerUuidsNotBroadcast)
    }

    async fn broadcast_worker_uuids(&self) -> EngineResult<()> {
        *self.worker_uuids.write().await = Some(self.workers.worker_uuids());
        Ok(())
    }

    fn acquire_clean_job_lock(&self) -> Arc<dyn DistributedLock> {
        Arc::new(LocalLock)
    }

    async fn stop(&self) -> EngineResult<()> {
        Ok(())
    }
}

/// 单节点没有需要协调的对象
struct LocalLock;

#[async_trait]
impl DistributedLock for LocalLock {
    async fn lock(&self) -> EngineResult<()> {
        Ok(())
    }

    async fn try_lock(&self, _timeout: Duration) -> EngineResult<bool> {
        Ok(true)
    }

    async fn unlock(&self) -> EngineResult<()> {
        Ok(())
    }
}
