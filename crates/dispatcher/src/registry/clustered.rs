use async_trait::async_trait;
use engine_core::EngineResult;
use engine_domain::{ClusterMembership, DistributedLock, WorkerUuidsProvider};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::DistributedWorkerRegistry;

/// 集群复制映射名：节点ID -> 该节点的Worker UUID
pub const WORKER_UUIDS_MAP: &str = "ce_worker_uuids";
pub const CLEAN_JOB_LOCK: &str = "ce_clean_job_lock";

pub struct ClusteredWorkerRegistry {
    membership: Arc<dyn ClusterMembership>,
    workers: Arc<dyn WorkerUuidsProvider>,
}

impl ClusteredWorkerRegistry {
    pub fn new(membership: Arc<dyn ClusterMembership>, workers: Arc<dyn WorkerUuidsProvider>) -> Self {
        Self { membership, workers }
    }
}

#[async_trait]
impl DistributedWorkerRegistry for ClusteredWorkerRegistry {
    async fn get_worker_uuids(&self) -> EngineResult<HashSet<String>> {
        let entries = self
            .membership
            .replicated_map(WORKER_UUIDS_MAP)
            .entries()
            .await?;
        let members = self.membership.current_member_ids().await?;

        // 已离开的节点留下的条目不算
        Ok(entries
            .into_iter()
            .filter(|(node_id, _)| members.contains(node_id))
            .flat_map(|(_, uuids)| uuids)
            .collect())
    }

    async fn broadcast_worker_uuids(&self) -> EngineResult<()> {
        let uuids = self.workers.worker_uuids();
        debug!(
            "Broadcasting {} worker UUIDs for node {}",
            uuids.len(),
            self.membership.this_node_id()
        );
        self.membership
            .replicated_map(WORKER_UUIDS_MAP)
            .put(self.membership.this_node_id(), uuids)
            .await
    }

    fn acquire_clean_job_lock(&self) -> Arc<dyn DistributedLock> {
        self.membership.distributed_lock(CLEAN_JOB_LOCK)
    }

    async fn stop(&self) -> EngineResult<()> {
        let node_id = self.membership.this_node_id();
        match self
            .membership
            .replicated_map(WORKER_UUIDS_MAP)
            .remove(node_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_transport_unavailable() => {
                warn!("Failed to remove worker UUIDs of node {} from the cluster: {}", node_id, e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
