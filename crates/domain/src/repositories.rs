//! 领域仓储抽象
//!
//! 任务队列的所有持久化操作都在调用方显式打开的事务会话中执行：
//! `TaskStore::begin()` 打开会话，`StoreSession::commit()` 提交。
//! 未提交就被丢弃的会话视为回滚，其中的写入对其他读者不可见。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_core::EngineResult;
use std::collections::HashMap;

use crate::entities::{ActivityRecord, ComponentMetadata, QueuedTaskRecord, QueuedTaskStatus};

/// 任务记录存储
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 打开一个新的事务会话
    async fn begin(&self) -> EngineResult<Box<dyn StoreSession>>;
}

/// 事务会话
#[async_trait]
pub trait StoreSession: Send {
    async fn insert_queued(&mut self, record: &QueuedTaskRecord) -> EngineResult<()>;

    /// 批量写入，整批在同一事务内
    async fn insert_queued_batch(&mut self, records: &[QueuedTaskRecord]) -> EngineResult<()>;

    async fn select_queued_by_uuid(&mut self, uuid: &str) -> EngineResult<Option<QueuedTaskRecord>>;

    /// 按创建时间升序返回全部队列记录
    async fn select_all_queued_ascending(&mut self) -> EngineResult<Vec<QueuedTaskRecord>>;

    /// 返回是否确实删除了记录
    async fn delete_queued(&mut self, uuid: &str) -> EngineResult<bool>;

    /// 把 IN_PROGRESS 记录放回 PENDING，清空 worker_uuid 与 started_at
    async fn reset_to_pending(&mut self, uuid: &str, now: DateTime<Utc>) -> EngineResult<bool>;

    async fn count_queued_by_status(&mut self, status: QueuedTaskStatus) -> EngineResult<u64>;

    /// 每个组件的PENDING记录数，没有PENDING记录的组件不出现在结果中
    async fn count_pending_by_components(
        &mut self,
        component_uuids: &[String],
    ) -> EngineResult<HashMap<String, u64>>;

    async fn insert_activity(&mut self, record: &ActivityRecord) -> EngineResult<()>;

    async fn select_activity_by_uuid(&mut self, uuid: &str) -> EngineResult<Option<ActivityRecord>>;

    /// 返回 `uuids` 中已有终态记录的UUID
    async fn select_existing_activity_uuids(&mut self, uuids: &[String]) -> EngineResult<Vec<String>>;

    /// 删除任务的输入数据（分析报告等），不存在时不报错
    async fn delete_task_input(&mut self, uuid: &str) -> EngineResult<()>;

    async fn select_component_by_uuid(&mut self, uuid: &str) -> EngineResult<Option<ComponentMetadata>>;

    /// 一次查询解析多个组件，未命中的UUID不出现在结果中
    async fn select_components_by_uuids(
        &mut self,
        uuids: &[String],
    ) -> EngineResult<Vec<ComponentMetadata>>;

    async fn select_property(&mut self, key: &str) -> EngineResult<Option<String>>;

    async fn save_property(&mut self, key: &str, value: &str) -> EngineResult<()>;

    async fn delete_property(&mut self, key: &str) -> EngineResult<()>;

    async fn commit(self: Box<Self>) -> EngineResult<()>;

    async fn rollback(self: Box<Self>) -> EngineResult<()>;
}
