use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 队列中任务记录的状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum QueuedTaskStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
}

impl QueuedTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueuedTaskStatus::Pending => "PENDING",
            QueuedTaskStatus::InProgress => "IN_PROGRESS",
        }
    }
}

impl fmt::Display for QueuedTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::Sqlite> for QueuedTaskStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for QueuedTaskStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "PENDING" => Ok(QueuedTaskStatus::Pending),
            "IN_PROGRESS" => Ok(QueuedTaskStatus::InProgress),
            _ => Err(format!("Invalid queued task status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for QueuedTaskStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 任务终态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ActivityStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELED")]
    Canceled,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Success => "SUCCESS",
            ActivityStatus::Failed => "FAILED",
            ActivityStatus::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::Sqlite> for ActivityStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ActivityStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "SUCCESS" => Ok(ActivityStatus::Success),
            "FAILED" => Ok(ActivityStatus::Failed),
            "CANCELED" => Ok(ActivityStatus::Canceled),
            _ => Err(format!("Invalid activity status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ActivityStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 队列中的任务记录
///
/// `uuid` 全局唯一，是一次提交从入队到终态的唯一标识。
/// 记录由 `TaskQueue` 以 PENDING 状态创建，之后由Worker改为 IN_PROGRESS 并最终移除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTaskRecord {
    pub uuid: String,
    pub task_type: String,
    pub component_uuid: Option<String>,
    pub status: QueuedTaskStatus,
    pub submitter_login: Option<String>,
    pub worker_uuid: Option<String>,
    /// 被Worker领取的次数
    pub execution_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

impl QueuedTaskRecord {
    pub fn is_pending(&self) -> bool {
        self.status == QueuedTaskStatus::Pending
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == QueuedTaskStatus::InProgress
    }
}

/// 任务终态记录，只追加，插入后不再更新
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub uuid: String,
    pub task_type: String,
    pub component_uuid: Option<String>,
    pub status: ActivityStatus,
    pub submitter_login: Option<String>,
    pub worker_uuid: Option<String>,
    pub execution_count: i32,
    pub analysis_uuid: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub executed_at: DateTime<Utc>,
}

impl ActivityRecord {
    /// 由即将移出队列的记录生成终态记录
    pub fn from_queued(record: &QueuedTaskRecord, status: ActivityStatus, now: DateTime<Utc>) -> Self {
        Self {
            uuid: record.uuid.clone(),
            task_type: record.task_type.clone(),
            component_uuid: record.component_uuid.clone(),
            status,
            submitter_login: record.submitter_login.clone(),
            worker_uuid: record.worker_uuid.clone(),
            execution_count: record.execution_count,
            analysis_uuid: None,
            submitted_at: record.created_at,
            started_at: record.started_at,
            executed_at: now,
        }
    }
}

/// 组件元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    pub uuid: String,
    pub key: String,
    pub name: String,
    pub organization_uuid: String,
}

/// 提交选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmitOption {
    /// 组件已有PENDING任务时不再入队
    UniqueQueuePerComponent,
}

/// Worker暂停状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkersPauseStatus {
    /// 已请求暂停，但仍有任务在执行
    Pausing,
    Paused,
    Resumed,
}
