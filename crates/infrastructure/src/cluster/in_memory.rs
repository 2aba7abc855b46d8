use async_trait::async_trait;
use engine_core::{EngineError, EngineResult};
use engine_domain::{ClusterMembership, DistributedLock, ReplicatedMap};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Default)]
struct ClusterState {
    members: Mutex<HashSet<String>>,
    /// 映射名 -> (节点ID -> 值集合)
    maps: Mutex<HashMap<String, HashMap<String, HashSet<String>>>>,
    /// 锁名 -> 持有者节点ID
    locks: Mutex<HashMap<String, String>>,
    lock_released: Notify,
}

fn poisoned(what: &str) -> EngineError {
    EngineError::Cluster(format!("Failed to lock {what}"))
}

/// 进程内集群
///
/// 多个 `InMemoryClusterMember` 共享同一份状态，行为与真实集群一致：
/// 节点离开后它写入的映射条目仍然保留，读者需要按存活成员过滤。
#[derive(Clone, Default)]
pub struct InMemoryCluster {
    state: Arc<ClusterState>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以 `node_id` 加入集群
    pub fn join(&self, node_id: impl Into<String>) -> EngineResult<InMemoryClusterMember> {
        let node_id = node_id.into();
        self.state
            .members
            .lock()
            .map_err(|_| poisoned("cluster members"))?
            .insert(node_id.clone());
        debug!("节点加入进程内集群: {}", node_id);
        Ok(InMemoryClusterMember {
            node_id,
            state: Arc::clone(&self.state),
        })
    }
}

/// 进程内集群中的一个节点
#[derive(Clone)]
pub struct InMemoryClusterMember {
    node_id: String,
    state: Arc<ClusterState>,
}

impl InMemoryClusterMember {
    /// 离开集群，释放本节点持有的锁。写入的映射条目保留。
    pub fn leave(&self) -> EngineResult<()> {
        self.state
            .members
            .lock()
            .map_err(|_| poisoned("cluster members"))?
            .remove(&self.node_id);
        self.state
            .locks
            .lock()
            .map_err(|_| poisoned("cluster locks"))?
            .retain(|_, holder| holder != &self.node_id);
        self.state.lock_released.notify_waiters();
        debug!("节点离开进程内集群: {}", self.node_id);
        Ok(())
    }
}

#[async_trait]
impl ClusterMembership for InMemoryClusterMember {
    fn this_node_id(&self) -> &str {
        &self.node_id
    }

    async fn current_member_ids(&self) -> EngineResult<HashSet<String>> {
        Ok(self
            .state
            .members
            .lock()
            .map_err(|_| poisoned("cluster members"))?
            .clone())
    }

    fn replicated_map(&self, name: &str) -> Arc<dyn ReplicatedMap> {
        Arc::new(InMemoryReplicatedMap {
            name: name.to_string(),
            state: Arc::clone(&self.state),
        })
    }

    fn distributed_lock(&self, name: &str) -> Arc<dyn DistributedLock> {
        Arc::new(InMemoryLock {
            name: name.to_string(),
            node_id: self.node_id.clone(),
            state: Arc::clone(&self.state),
        })
    }
}

struct InMemoryReplicatedMap {
    name: String,
    state: Arc<ClusterState>,
}

#[async_trait]
impl ReplicatedMap for InMemoryReplicatedMap {
    async fn put(&self, key: &str, value: HashSet<String>) -> EngineResult<()> {
        self.state
            .maps
            .lock()
            .map_err(|_| poisoned("replicated maps"))?
            .entry(self.name.clone())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> EngineResult<()> {
        if let Some(map) = self
            .state
            .maps
            .lock()
            .map_err(|_| poisoned("replicated maps"))?
            .get_mut(&self.name)
        {
            map.remove(key);
        }
        Ok(())
    }

    async fn entries(&self) -> EngineResult<HashMap<String, HashSet<String>>> {
        Ok(self
            .state
            .maps
            .lock()
            .map_err(|_| poisoned("replicated maps"))?
            .get(&self.name)
            .cloned()
            .unwrap_or_default())
    }
}

struct InMemoryLock {
    name: String,
    node_id: String,
    state: Arc<ClusterState>,
}

impl InMemoryLock {
    fn try_acquire(&self) -> EngineResult<bool> {
        let mut locks = self
            .state
            .locks
            .lock()
            .map_err(|_| poisoned("cluster locks"))?;
        if locks.contains_key(&self.name) {
            return Ok(false);
        }
        locks.insert(self.name.clone(), self.node_id.clone());
        Ok(true)
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    async fn lock(&self) -> EngineResult<()> {
        loop {
            // 先登记唤醒再检查，避免错过检查与等待之间的释放
            let notified = self.state.lock_released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.try_acquire()? {
                return Ok(());
            }
            notified.await;
        }
    }

    async fn try_lock(&self, timeout: Duration) -> EngineResult<bool> {
        if self.try_acquire()? {
            return Ok(true);
        }
        if timeout.is_zero() {
            return Ok(false);
        }
        match tokio::time::timeout(timeout, self.lock()).await {
            Ok(result) => result.map(|_| true),
            Err(_) => Ok(false),
        }
    }

    async fn unlock(&self) -> EngineResult<()> {
        {
            let mut locks = self
                .state
                .locks
                .lock()
                .map_err(|_| poisoned("cluster locks"))?;
            match locks.get(&self.name) {
                Some(holder) if holder == &self.node_id => {
                    locks.remove(&self.name);
                }
                _ => {
                    return Err(EngineError::Cluster(format!(
                        "锁 {} 不由节点 {} 持有",
                        self.name, self.node_id
                    )))
                }
            }
        }
        self.state.lock_released.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_join_and_leave_report_poisoned_state() {
        let cluster = InMemoryCluster::new();
        let member = cluster.join("node-1").unwrap();

        let state = Arc::clone(&cluster.state);
        let _ = std::thread::spawn(move || {
            let _members = state.members.lock().unwrap();
            panic!("poison members");
        })
        .join();

        assert!(matches!(cluster.join("node-2"), Err(EngineError::Cluster(_))));
        assert!(matches!(member.leave(), Err(EngineError::Cluster(_))));
    }

    #[tokio::test]
    async fn test_membership_follows_join_and_leave() {
        let cluster = InMemoryCluster::new();
        let node1 = cluster.join("node-1").unwrap();
        let node2 = cluster.join("node-2").unwrap();

        assert_eq!(node1.this_node_id(), "node-1");
        assert_eq!(
            node1.current_member_ids().await.unwrap(),
            set(&["node-1", "node-2"])
        );

        node2.leave().unwrap();
        assert_eq!(node1.current_member_ids().await.unwrap(), set(&["node-1"]));
    }

    #[tokio::test]
    async fn test_replicated_map_is_shared_and_outlives_members() {
        let cluster = InMemoryCluster::new();
        let node1 = cluster.join("node-1").unwrap();
        let node2 = cluster.join("node-2").unwrap();

        node1
            .replicated_map("workers")
            .put("node-1", set(&["w1"]))
            .await
            .unwrap();
        node2
            .replicated_map("workers")
            .put("node-2", set(&["w2"]))
            .await
            .unwrap();
        node2.leave().unwrap();

        let entries = node1.replicated_map("workers").entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["node-2"], set(&["w2"]));

        node1.replicated_map("workers").remove("node-2").await.unwrap();
        let entries = node1.replicated_map("workers").entries().await.unwrap();
        assert_eq!(entries.len(), 1);

        assert!(node1.replicated_map("other").entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_across_nodes() {
        let cluster = InMemoryCluster::new();
        let lock1 = cluster.join("node-1").unwrap().distributed_lock("clean");
        let lock2 = cluster.join("node-2").unwrap().distributed_lock("clean");

        assert!(lock1.try_lock(Duration::ZERO).await.unwrap());
        assert!(!lock2.try_lock(Duration::ZERO).await.unwrap());
        assert!(!lock2.try_lock(Duration::from_millis(20)).await.unwrap());
        assert!(lock2.unlock().await.is_err());

        lock1.unlock().await.unwrap();
        assert!(lock2.try_lock(Duration::ZERO).await.unwrap());
    }

    #[tokio::test]
    async fn test_waiting_lock_is_granted_on_release() {
        let cluster = InMemoryCluster::new();
        let lock1 = cluster.join("node-1").unwrap().distributed_lock("clean");
        let lock2 = cluster.join("node-2").unwrap().distributed_lock("clean");

        lock1.lock().await.unwrap();
        let waiter = tokio::spawn(async move { lock2.try_lock(Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        lock1.unlock().await.unwrap();

        assert!(waiter.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_leave_releases_held_locks() {
        let cluster = InMemoryCluster::new();
        let node1 = cluster.join("node-1").unwrap();
        let lock2 = cluster.join("node-2").unwrap().distributed_lock("clean");

        node1.distributed_lock("clean").lock().await.unwrap();
        node1.leave().unwrap();

        assert!(lock2.try_lock(Duration::ZERO).await.unwrap());
    }
}
