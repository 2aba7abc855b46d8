use engine_core::EngineResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::queue::TaskQueue;
use crate::registry::DistributedWorkerRegistry;

/// 一次清理的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningReport {
    pub canceled_worn_outs: usize,
    pub reset_tasks: usize,
}

/// 队列清理任务，集群内同一时间只在一个节点上运行
pub struct CleaningJob {
    queue: Arc<TaskQueue>,
    registry: Arc<dyn DistributedWorkerRegistry>,
    lock_wait: Duration,
}

impl CleaningJob {
    pub fn new(
        queue: Arc<TaskQueue>,
        registry: Arc<dyn DistributedWorkerRegistry>,
        lock_wait: Duration,
    ) -> Self {
        Self {
            queue,
            registry,
            lock_wait,
        }
    }

    /// 执行一次清理。未拿到集群锁时返回 `None`。
    pub async fn run_once(&self) -> EngineResult<Option<CleaningReport>> {
        let lock = self.registry.acquire_clean_job_lock();
        if !lock.try_lock(self.lock_wait).await? {
            debug!("Cleaning job is running on another node, skipping");
            return Ok(None);
        }

        let result = self.clean().await;
        if let Err(e) = lock.unlock().await {
            error!("Failed to release cleaning job lock: {}", e);
        }

        let report = result?;
        if report != CleaningReport::default() {
            info!(
                "Queue cleaning finished: {} worn out tasks canceled, {} tasks reset",
                report.canceled_worn_outs, report.reset_tasks
            );
        }
        Ok(Some(report))
    }

    async fn clean(&self) -> EngineResult<CleaningReport> {
        let canceled_worn_outs = self.queue.cancel_worn_outs().await?;
        let known_workers = self.registry.get_worker_uuids().await?;
        let reset_tasks = self
            .queue
            .reset_tasks_with_unknown_worker_uuids(&known_workers)
            .await?;

        Ok(CleaningReport {
            canceled_worn_outs,
            reset_tasks,
        })
    }
}
