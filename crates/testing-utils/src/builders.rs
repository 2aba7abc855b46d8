//! Test data builders

use chrono::{DateTime, Duration, Utc};
use engine_domain::{ComponentMetadata, QueuedTaskRecord, QueuedTaskStatus};

/// Builder for creating test QueuedTaskRecord entities
pub struct QueuedTaskRecordBuilder {
    record: QueuedTaskRecord,
}

impl QueuedTaskRecordBuilder {
    pub fn new(uuid: &str) -> Self {
        let now = Utc::now();
        Self {
            record: QueuedTaskRecord {
                uuid: uuid.to_string(),
                task_type: "foo".to_string(),
                component_uuid: None,
                status: QueuedTaskStatus::Pending,
                submitter_login: None,
                worker_uuid: None,
                execution_count: 0,
                created_at: now,
                updated_at: now,
                started_at: None,
            },
        }
    }

    pub fn with_task_type(mut self, task_type: &str) -> Self {
        self.record.task_type = task_type.to_string();
        self
    }

    pub fn with_component_uuid(mut self, component_uuid: &str) -> Self {
        self.record.component_uuid = Some(component_uuid.to_string());
        self
    }

    pub fn with_status(mut self, status: QueuedTaskStatus) -> Self {
        self.record.status = status;
        if status == QueuedTaskStatus::InProgress && self.record.started_at.is_none() {
            self.record.started_at = Some(self.record.created_at);
        }
        self
    }

    pub fn in_progress(self, worker_uuid: &str) -> Self {
        self.with_status(QueuedTaskStatus::InProgress)
            .with_worker_uuid(Some(worker_uuid))
    }

    pub fn with_worker_uuid(mut self, worker_uuid: Option<&str>) -> Self {
        self.record.worker_uuid = worker_uuid.map(str::to_string);
        self
    }

    pub fn with_execution_count(mut self, execution_count: i32) -> Self {
        self.record.execution_count = execution_count;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.record.created_at = created_at;
        self.record.updated_at = created_at;
        self
    }

    /// 以当前时间为基准向前偏移，便于构造有序的记录
    pub fn created_seconds_ago(self, seconds: i64) -> Self {
        self.with_created_at(Utc::now() - Duration::seconds(seconds))
    }

    pub fn build(self) -> QueuedTaskRecord {
        self.record
    }
}

pub fn component(uuid: &str, key: &str, name: &str, organization_uuid: &str) -> ComponentMetadata {
    ComponentMetadata {
        uuid: uuid.to_string(),
        key: key.to_string(),
        name: name.to_string(),
        organization_uuid: organization_uuid.to_string(),
    }
}
