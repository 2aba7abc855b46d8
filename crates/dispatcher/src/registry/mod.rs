//! 集群范围内的Worker身份登记与清理任务锁
//!
//! 按部署拓扑选择实现：多节点使用 [`ClusteredWorkerRegistry`]，
//! 单节点使用 [`StandaloneWorkerRegistry`]，调用方只依赖 [`DistributedWorkerRegistry`]。

pub mod clustered;
pub mod standalone;

pub use clustered::ClusteredWorkerRegistry;
pub use standalone::StandaloneWorkerRegistry;

use async_trait::async_trait;
use engine_core::EngineResult;
use engine_domain::DistributedLock;
use std::collections::HashSet;
use std::sync::Arc;

#[async_trait]
pub trait DistributedWorkerRegistry: Send + Sync {
    /// 所有存活节点上的Worker UUID
    async fn get_worker_uuids(&self) -> EngineResult<HashSet<String>>;

    /// 发布本节点Worker池当前的Worker UUID
    async fn broadcast_worker_uuids(&self) -> EngineResult<()>;

    /// 串行化清理任务的集群锁，只用于清理任务
    fn acquire_clean_job_lock(&self) -> Arc<dyn DistributedLock>;

    /// 节点停止时撤销本节点的登记
    async fn stop(&self) -> EngineResult<()>;
}
