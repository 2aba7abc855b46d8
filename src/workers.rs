use engine_domain::WorkerUuidsProvider;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};
use tracing::info;
use uuid::Uuid;

/// 本节点的Worker池
///
/// 每次启动都会为Worker分配新的UUID，停止后集合清空。
/// 注册表通过 [`WorkerUuidsProvider`] 读取当前集合并广播到集群。
pub struct WorkerPool {
    worker_count: usize,
    uuids: RwLock<HashSet<String>>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            uuids: RwLock::new(HashSet::new()),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn start(&self) {
        let fresh: HashSet<String> = (0..self.worker_count)
            .map(|_| Uuid::new_v4().to_string())
            .collect();

        let mut uuids = self.uuids.write().unwrap_or_else(PoisonError::into_inner);
        *uuids = fresh;
        info!("Started {} compute engine workers", uuids.len());
    }

    pub fn stop(&self) {
        let mut uuids = self.uuids.write().unwrap_or_else(PoisonError::into_inner);
        let stopped = uuids.len();
        uuids.clear();
        info!("Stopped {} compute engine workers", stopped);
    }

    pub fn is_running(&self) -> bool {
        !self
            .uuids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl WorkerUuidsProvider for WorkerPool {
    fn worker_uuids(&self) -> HashSet<String> {
        self.uuids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_assigns_fresh_uuids() {
        let pool = WorkerPool::new(3);
        assert!(!pool.is_running());
        assert!(pool.worker_uuids().is_empty());

        pool.start();
        let first = pool.worker_uuids();
        assert_eq!(first.len(), 3);
        assert!(pool.is_running());

        pool.start();
        let second = pool.worker_uuids();
        assert_eq!(second.len(), 3);
        assert!(first.is_disjoint(&second));
    }

    #[test]
    fn test_stop_clears_uuids() {
        let pool = WorkerPool::new(2);
        pool.start();

        pool.stop();

        assert!(!pool.is_running());
        assert!(pool.worker_uuids().is_empty());
    }
}
