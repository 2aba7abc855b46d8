//! 集群成员关系抽象
//!
//! 只定义本模块消费的契约，具体传输（Redis、进程内）由基础设施层实现。

use async_trait::async_trait;
use engine_core::EngineResult;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// 集群成员关系
#[async_trait]
pub trait ClusterMembership: Send + Sync {
    fn this_node_id(&self) -> &str;

    /// 当前存活的节点ID集合
    async fn current_member_ids(&self) -> EngineResult<HashSet<String>>;

    /// 名为 `name` 的集群复制映射：节点ID -> 字符串集合
    fn replicated_map(&self, name: &str) -> Arc<dyn ReplicatedMap>;

    /// 名为 `name` 的集群互斥锁
    fn distributed_lock(&self, name: &str) -> Arc<dyn DistributedLock>;
}

#[async_trait]
pub trait ReplicatedMap: Send + Sync {
    async fn put(&self, key: &str, value: HashSet<String>) -> EngineResult<()>;

    async fn remove(&self, key: &str) -> EngineResult<()>;

    async fn entries(&self) -> EngineResult<HashMap<String, HashSet<String>>>;
}

/// 集群互斥锁
///
/// 锁的持有者是节点：同一个节点内的并发调用方需要自行串行化。
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// 阻塞直到获得锁
    async fn lock(&self) -> EngineResult<()>;

    /// 在 `timeout` 内尝试获得锁，超时返回 `false`
    async fn try_lock(&self, timeout: Duration) -> EngineResult<bool>;

    async fn unlock(&self) -> EngineResult<()>;
}

/// 本节点Worker池当前的Worker UUID来源
pub trait WorkerUuidsProvider: Send + Sync {
    fn worker_uuids(&self) -> HashSet<String>;
}
