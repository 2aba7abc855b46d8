//! In-memory implementation of the task store for testing
//!
//! 会话在打开时独占整个存储（串行化隔离），在工作副本上读写，
//! `commit()` 时整体替换，丢弃或 `rollback()` 则不留下任何修改。
//! 同时记录各操作的调用次数，测试可以据此断言查询次数。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_core::{EngineError, EngineResult};
use engine_domain::{
    ActivityRecord, ComponentMetadata, QueuedTaskRecord, QueuedTaskStatus, StoreSession, TaskStore,
    WorkerUuidsProvider,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
pub struct StoreState {
    /// 按插入顺序保存
    pub queued: Vec<QueuedTaskRecord>,
    pub activities: Vec<ActivityRecord>,
    pub components: HashMap<String, ComponentMetadata>,
    pub task_inputs: HashMap<String, Vec<u8>>,
    pub properties: HashMap<String, String>,
}

/// 调用计数
#[derive(Debug, Clone, Default)]
pub struct StoreCalls {
    pub begin: usize,
    pub commit: usize,
    pub rollback: usize,
    pub insert_queued: usize,
    pub insert_queued_batch: usize,
    pub select_component_by_uuid: usize,
    /// 每次批量组件查询的参数
    pub select_components_by_uuids: Vec<Vec<String>>,
    pub count_pending_by_components: usize,
}

#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<AsyncMutex<StoreState>>,
    calls: Arc<Mutex<StoreCalls>>,
    failing_operation: Arc<Mutex<Option<&'static str>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> StoreCalls {
        self.calls.lock().unwrap().clone()
    }

    pub fn reset_calls(&self) {
        *self.calls.lock().unwrap() = StoreCalls::default();
    }

    /// 之后名为 `operation` 的会话操作都返回错误
    pub fn fail_operation(&self, operation: &'static str) {
        *self.failing_operation.lock().unwrap() = Some(operation);
    }

    pub fn clear_failure(&self) {
        *self.failing_operation.lock().unwrap() = None;
    }

    pub async fn insert_component(&self, component: ComponentMetadata) {
        let mut state = self.state.lock().await;
        state.components.insert(component.uuid.clone(), component);
    }

    /// 绕过队列直接写入记录，模拟Worker已经修改过的状态
    pub async fn insert_queued_record(&self, record: QueuedTaskRecord) {
        self.state.lock().await.queued.push(record);
    }

    pub async fn insert_task_input(&self, uuid: &str, data: Vec<u8>) {
        self.state.lock().await.task_inputs.insert(uuid.to_string(), data);
    }

    pub async fn has_task_input(&self, uuid: &str) -> bool {
        self.state.lock().await.task_inputs.contains_key(uuid)
    }

    pub async fn queued(&self) -> Vec<QueuedTaskRecord> {
        self.state.lock().await.queued.clone()
    }

    pub async fn queued_by_uuid(&self, uuid: &str) -> Option<QueuedTaskRecord> {
        self.state
            .lock()
            .await
            .queued
            .iter()
            .find(|r| r.uuid == uuid)
            .cloned()
    }

    pub async fn activity(&self, uuid: &str) -> Option<ActivityRecord> {
        self.state
            .lock()
            .await
            .activities
            .iter()
            .find(|a| a.uuid == uuid)
            .cloned()
    }

    pub async fn activities(&self) -> Vec<ActivityRecord> {
        self.state.lock().await.activities.clone()
    }

    pub async fn property(&self, key: &str) -> Option<String> {
        self.state.lock().await.properties.get(key).cloned()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn begin(&self) -> EngineResult<Box<dyn StoreSession>> {
        self.calls.lock().unwrap().begin += 1;
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemorySession {
            guard,
            working,
            calls: Arc::clone(&self.calls),
            failing_operation: Arc::clone(&self.failing_operation),
        }))
    }
}

pub struct InMemorySession {
    guard: OwnedMutexGuard<StoreState>,
    working: StoreState,
    calls: Arc<Mutex<StoreCalls>>,
    failing_operation: Arc<Mutex<Option<&'static str>>>,
}

impl InMemorySession {
    fn check(&self, operation: &'static str) -> EngineResult<()> {
        if *self.failing_operation.lock().unwrap() == Some(operation) {
            return Err(EngineError::DatabaseOperation(format!(
                "injected failure: {operation}"
            )));
        }
        Ok(())
    }

    fn push_queued(&mut self, record: &QueuedTaskRecord) -> EngineResult<()> {
        if self.working.queued.iter().any(|r| r.uuid == record.uuid) {
            return Err(EngineError::DatabaseOperation(format!(
                "UNIQUE constraint failed: queued_tasks.uuid ({})",
                record.uuid
            )));
        }
        self.working.queued.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl StoreSession for InMemorySession {
    async fn insert_queued(&mut self, record: &QueuedTaskRecord) -> EngineResult<()> {
        self.check("insert_queued")?;
        self.calls.lock().unwrap().insert_queued += 1;
        self.push_queued(record)
    }

    async fn insert_queued_batch(&mut self, records: &[QueuedTaskRecord]) -> EngineResult<()> {
        self.check("insert_queued_batch")?;
        self.calls.lock().unwrap().insert_queued_batch += 1;
        for record in records {
            self.push_queued(record)?;
        }
        Ok(())
    }

    async fn select_queued_by_uuid(&mut self, uuid: &str) -> EngineResult<Option<QueuedTaskRecord>> {
        self.check("select_queued_by_uuid")?;
        Ok(self.working.queued.iter().find(|r| r.uuid == uuid).cloned())
    }

    async fn select_all_queued_ascending(&mut self) -> EngineResult<Vec<QueuedTaskRecord>> {
        self.check("select_all_queued_ascending")?;
        let mut records = self.working.queued.clone();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn delete_queued(&mut self, uuid: &str) -> EngineResult<bool> {
        self.check("delete_queued")?;
        let before = self.working.queued.len();
        self.working.queued.retain(|r| r.uuid != uuid);
        Ok(self.working.queued.len() != before)
    }

    async fn reset_to_pending(&mut self, uuid: &str, now: DateTime<Utc>) -> EngineResult<bool> {
        self.check("reset_to_pending")?;
        match self
            .working
            .queued
            .iter_mut()
            .find(|r| r.uuid == uuid && r.status == QueuedTaskStatus::InProgress)
        {
            Some(record) => {
                record.status = QueuedTaskStatus::Pending;
                record.worker_uuid = None;
                record.started_at = None;
                record.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_queued_by_status(&mut self, status: QueuedTaskStatus) -> EngineResult<u64> {
        self.check("count_queued_by_status")?;
        Ok(self.working.queued.iter().filter(|r| r.status == status).count() as u64)
    }

    async fn count_pending_by_components(
        &mut self,
        component_uuids: &[String],
    ) -> EngineResult<HashMap<String, u64>> {
        self.check("count_pending_by_components")?;
        self.calls.lock().unwrap().count_pending_by_components += 1;
        let wanted: HashSet<&String> = component_uuids.iter().collect();
        let mut counts = HashMap::new();
        for record in self.working.queued.iter().filter(|r| r.is_pending()) {
            if let Some(component_uuid) = &record.component_uuid {
                if wanted.contains(component_uuid) {
                    *counts.entry(component_uuid.clone()).or_insert(0) += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn insert_activity(&mut self, record: &ActivityRecord) -> EngineResult<()> {
        self.check("insert_activity")?;
        if self.working.activities.iter().any(|a| a.uuid == record.uuid) {
            return Err(EngineError::DatabaseOperation(format!(
                "UNIQUE constraint failed: task_activities.uuid ({})",
                record.uuid
            )));
        }
        self.working.activities.push(record.clone());
        Ok(())
    }

    async fn select_activity_by_uuid(&mut self, uuid: &str) -> EngineResult<Option<ActivityRecord>> {
        self.check("select_activity_by_uuid")?;
        Ok(self.working.activities.iter().find(|a| a.uuid == uuid).cloned())
    }

    async fn select_existing_activity_uuids(&mut self, uuids: &[String]) -> EngineResult<Vec<String>> {
        self.check("select_existing_activity_uuids")?;
        Ok(self
            .working
            .activities
            .iter()
            .filter(|a| uuids.contains(&a.uuid))
            .map(|a| a.uuid.clone())
            .collect())
    }

    async fn delete_task_input(&mut self, uuid: &str) -> EngineResult<()> {
        self.check("delete_task_input")?;
        self.working.task_inputs.remove(uuid);
        Ok(())
    }

    async fn select_component_by_uuid(&mut self, uuid: &str) -> EngineResult<Option<ComponentMetadata>> {
        self.check("select_component_by_uuid")?;
        self.calls.lock().unwrap().select_component_by_uuid += 1;
        Ok(self.working.components.get(uuid).cloned())
    }

    async fn select_components_by_uuids(
        &mut self,
        uuids: &[String],
    ) -> EngineResult<Vec<ComponentMetadata>> {
        self.check("select_components_by_uuids")?;
        self.calls
            .lock()
            .unwrap()
            .select_components_by_uuids
            .push(uuids.to_vec());
        Ok(uuids
            .iter()
            .filter_map(|uuid| self.working.components.get(uuid).cloned())
            .collect())
    }

    async fn select_property(&mut self, key: &str) -> EngineResult<Option<String>> {
        self.check("select_property")?;
        Ok(self.working.properties.get(key).cloned())
    }

    async fn save_property(&mut self, key: &str, value: &str) -> EngineResult<()> {
        self.check("save_property")?;
        self.working.properties.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_property(&mut self, key: &str) -> EngineResult<()> {
        self.check("delete_property")?;
        self.working.properties.remove(key);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> EngineResult<()> {
        self.check("commit")?;
        self.calls.lock().unwrap().commit += 1;
        let InMemorySession {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> EngineResult<()> {
        self.calls.lock().unwrap().rollback += 1;
        Ok(())
    }
}

/// 可在测试中修改的Worker UUID来源
#[derive(Clone, Default)]
pub struct FixedWorkerUuids {
    uuids: Arc<Mutex<HashSet<String>>>,
}

impl FixedWorkerUuids {
    pub fn new(uuids: &[&str]) -> Self {
        let provider = Self::default();
        provider.set(uuids);
        provider
    }

    pub fn set(&self, uuids: &[&str]) {
        *self.uuids.lock().unwrap() = uuids.iter().map(|u| u.to_string()).collect();
    }
}

impl WorkerUuidsProvider for FixedWorkerUuids {
    fn worker_uuids(&self) -> HashSet<String> {
        self.uuids.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::QueuedTaskRecordBuilder;

    #[tokio::test]
    async fn test_uncommitted_session_leaves_no_trace() {
        let store = InMemoryTaskStore::new();

        let mut session = store.begin().await.unwrap();
        session
            .insert_queued(&QueuedTaskRecordBuilder::new("T1").build())
            .await
            .unwrap();
        drop(session);

        assert!(store.queued().await.is_empty());

        let mut session = store.begin().await.unwrap();
        session
            .insert_queued(&QueuedTaskRecordBuilder::new("T1").build())
            .await
            .unwrap();
        session.commit().await.unwrap();

        assert_eq!(store.queued().await.len(), 1);
        assert_eq!(store.calls().begin, 2);
        assert_eq!(store.calls().commit, 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = InMemoryTaskStore::new();
        store.fail_operation("insert_queued");

        let mut session = store.begin().await.unwrap();
        let result = session
            .insert_queued(&QueuedTaskRecordBuilder::new("T1").build())
            .await;
        assert!(result.is_err());
    }
}
