use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_core::{EngineError, EngineResult};
use engine_domain::{
    ActivityRecord, ComponentMetadata, QueuedTaskRecord, QueuedTaskStatus, StoreSession, TaskStore,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// 单条SQL中绑定参数的上限远大于此，按块拆分只是为了控制语句长度
const BATCH_CHUNK_SIZE: usize = 200;

const QUEUED_COLUMNS: &str = "uuid, task_type, component_uuid, status, submitter_login, worker_uuid, \
     execution_count, created_at, updated_at, started_at";

const ACTIVITY_COLUMNS: &str = "uuid, task_type, component_uuid, status, submitter_login, worker_uuid, \
     execution_count, analysis_uuid, submitted_at, started_at, executed_at";

/// 基于SQLite的任务记录存储
#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 写入或更新组件元数据。组件由其他子系统维护，这里只为嵌入式部署与测试提供入口。
    pub async fn upsert_component(&self, component: &ComponentMetadata) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO components (uuid, component_key, name, organization_uuid) VALUES (?, ?, ?, ?)
             ON CONFLICT(uuid) DO UPDATE SET component_key = excluded.component_key,
                 name = excluded.name, organization_uuid = excluded.organization_uuid",
        )
        .bind(&component.uuid)
        .bind(&component.key)
        .bind(&component.name)
        .bind(&component.organization_uuid)
        .execute(&self.pool)
        .await
        .map_err(EngineError::Database)?;
        Ok(())
    }

    /// 保存任务输入数据，由上传分析报告的入口调用
    pub async fn insert_task_input(&self, task_uuid: &str, data: &[u8]) -> EngineResult<()> {
        sqlx::query("INSERT INTO task_inputs (task_uuid, input_data, created_at) VALUES (?, ?, ?)")
            .bind(task_uuid)
            .bind(data)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(EngineError::Database)?;
        Ok(())
    }

    pub async fn has_task_input(&self, task_uuid: &str) -> EngineResult<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM task_inputs WHERE task_uuid = ?")
            .bind(task_uuid)
            .fetch_one(&self.pool)
            .await
            .map_err(EngineError::Database)?;
        let count: i64 = row.try_get("cnt")?;
        Ok(count > 0)
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn begin(&self) -> EngineResult<Box<dyn StoreSession>> {
        let tx = self.pool.begin().await.map_err(EngineError::Database)?;
        Ok(Box::new(SqliteStoreSession { tx }))
    }
}

fn from_millis(millis: i64) -> EngineResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| EngineError::DatabaseOperation(format!("无效的时间戳: {millis}")))
}

fn row_to_queued(row: &SqliteRow) -> EngineResult<QueuedTaskRecord> {
    let started_at: Option<i64> = row.try_get("started_at")?;
    Ok(QueuedTaskRecord {
        uuid: row.try_get("uuid")?,
        task_type: row.try_get("task_type")?,
        component_uuid: row.try_get("component_uuid")?,
        status: row.try_get("status")?,
        submitter_login: row.try_get("submitter_login")?,
        worker_uuid: row.try_get("worker_uuid")?,
        execution_count: row.try_get("execution_count")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
        started_at: started_at.map(from_millis).transpose()?,
    })
}

fn row_to_activity(row: &SqliteRow) -> EngineResult<ActivityRecord> {
    let started_at: Option<i64> = row.try_get("started_at")?;
    Ok(ActivityRecord {
        uuid: row.try_get("uuid")?,
        task_type: row.try_get("task_type")?,
        component_uuid: row.try_get("component_uuid")?,
        status: row.try_get("status")?,
        submitter_login: row.try_get("submitter_login")?,
        worker_uuid: row.try_get("worker_uuid")?,
        execution_count: row.try_get("execution_count")?,
        analysis_uuid: row.try_get("analysis_uuid")?,
        submitted_at: from_millis(row.try_get("submitted_at")?)?,
        started_at: started_at.map(from_millis).transpose()?,
        executed_at: from_millis(row.try_get("executed_at")?)?,
    })
}

fn row_to_component(row: &SqliteRow) -> EngineResult<ComponentMetadata> {
    Ok(ComponentMetadata {
        uuid: row.try_get("uuid")?,
        key: row.try_get("component_key")?,
        name: row.try_get("name")?,
        organization_uuid: row.try_get("organization_uuid")?,
    })
}

/// 一个SQLite事务。未提交就被丢弃时由sqlx自动回滚。
pub struct SqliteStoreSession {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StoreSession for SqliteStoreSession {
    #[instrument(skip(self, record), fields(task.uuid = %record.uuid))]
    async fn insert_queued(&mut self, record: &QueuedTaskRecord) -> EngineResult<()> {
        sqlx::query(&format!(
            "INSERT INTO queued_tasks ({QUEUED_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&record.uuid)
        .bind(&record.task_type)
        .bind(&record.component_uuid)
        .bind(record.status)
        .bind(&record.submitter_login)
        .bind(&record.worker_uuid)
        .bind(record.execution_count)
        .bind(record.created_at.timestamp_millis())
        .bind(record.updated_at.timestamp_millis())
        .bind(record.started_at.map(|t| t.timestamp_millis()))
        .execute(&mut *self.tx)
        .await
        .map_err(EngineError::Database)?;
        Ok(())
    }

    #[instrument(skip(self, records), fields(batch.size = records.len()))]
    async fn insert_queued_batch(&mut self, records: &[QueuedTaskRecord]) -> EngineResult<()> {
        for chunk in records.chunks(BATCH_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("INSERT INTO queued_tasks ({QUEUED_COLUMNS}) "));
            builder.push_values(chunk, |mut b, record| {
                b.push_bind(record.uuid.clone())
                    .push_bind(record.task_type.clone())
                    .push_bind(record.component_uuid.clone())
                    .push_bind(record.status)
                    .push_bind(record.submitter_login.clone())
                    .push_bind(record.worker_uuid.clone())
                    .push_bind(record.execution_count)
                    .push_bind(record.created_at.timestamp_millis())
                    .push_bind(record.updated_at.timestamp_millis())
                    .push_bind(record.started_at.map(|t| t.timestamp_millis()));
            });
            builder
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(EngineError::Database)?;
        }
        debug!("批量写入队列记录: {} 条", records.len());
        Ok(())
    }

    async fn select_queued_by_uuid(&mut self, uuid: &str) -> EngineResult<Option<QueuedTaskRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {QUEUED_COLUMNS} FROM queued_tasks WHERE uuid = ?"
        ))
        .bind(uuid)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(EngineError::Database)?;

        row.as_ref().map(row_to_queued).transpose()
    }

    async fn select_all_queued_ascending(&mut self) -> EngineResult<Vec<QueuedTaskRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {QUEUED_COLUMNS} FROM queued_tasks ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(EngineError::Database)?;

        rows.iter().map(row_to_queued).collect()
    }

    #[instrument(skip(self))]
    async fn delete_queued(&mut self, uuid: &str) -> EngineResult<bool> {
        let result = sqlx::query("DELETE FROM queued_tasks WHERE uuid = ?")
            .bind(uuid)
            .execute(&mut *self.tx)
            .await
            .map_err(EngineError::Database)?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn reset_to_pending(&mut self, uuid: &str, now: DateTime<Utc>) -> EngineResult<bool> {
        let result = sqlx::query(
            "UPDATE queued_tasks
             SET status = ?, worker_uuid = NULL, started_at = NULL, updated_at = ?
             WHERE uuid = ? AND status = ?",
        )
        .bind(QueuedTaskStatus::Pending)
        .bind(now.timestamp_millis())
        .bind(uuid)
        .bind(QueuedTaskStatus::InProgress)
        .execute(&mut *self.tx)
        .await
        .map_err(EngineError::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_queued_by_status(&mut self, status: QueuedTaskStatus) -> EngineResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM queued_tasks WHERE status = ?")
            .bind(status)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(EngineError::Database)?;
        let count: i64 = row.try_get("cnt")?;
        Ok(count as u64)
    }

    async fn count_pending_by_components(
        &mut self,
        component_uuids: &[String],
    ) -> EngineResult<HashMap<String, u64>> {
        let mut counts = HashMap::new();
        for chunk in component_uuids.chunks(BATCH_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT component_uuid, COUNT(*) AS cnt FROM queued_tasks WHERE status = ",
            );
            builder.push_bind(QueuedTaskStatus::Pending);
            builder.push(" AND component_uuid IN (");
            let mut separated = builder.separated(", ");
            for uuid in chunk {
                separated.push_bind(uuid.clone());
            }
            separated.push_unseparated(") GROUP BY component_uuid");

            let rows = builder
                .build()
                .fetch_all(&mut *self.tx)
                .await
                .map_err(EngineError::Database)?;
            for row in rows {
                let component_uuid: String = row.try_get("component_uuid")?;
                let count: i64 = row.try_get("cnt")?;
                counts.insert(component_uuid, count as u64);
            }
        }
        Ok(counts)
    }

    #[instrument(skip(self, record), fields(task.uuid = %record.uuid, activity.status = %record.status))]
    async fn insert_activity(&mut self, record: &ActivityRecord) -> EngineResult<()> {
        sqlx::query(&format!(
            "INSERT INTO task_activities ({ACTIVITY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&record.uuid)
        .bind(&record.task_type)
        .bind(&record.component_uuid)
        .bind(record.status)
        .bind(&record.submitter_login)
        .bind(&record.worker_uuid)
        .bind(record.execution_count)
        .bind(&record.analysis_uuid)
        .bind(record.submitted_at.timestamp_millis())
        .bind(record.started_at.map(|t| t.timestamp_millis()))
        .bind(record.executed_at.timestamp_millis())
        .execute(&mut *self.tx)
        .await
        .map_err(EngineError::Database)?;
        Ok(())
    }

    async fn select_activity_by_uuid(&mut self, uuid: &str) -> EngineResult<Option<ActivityRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM task_activities WHERE uuid = ?"
        ))
        .bind(uuid)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(EngineError::Database)?;

        row.as_ref().map(row_to_activity).transpose()
    }

    async fn select_existing_activity_uuids(&mut self, uuids: &[String]) -> EngineResult<Vec<String>> {
        let mut existing = Vec::new();
        for chunk in uuids.chunks(BATCH_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT uuid FROM task_activities WHERE uuid IN (");
            let mut separated = builder.separated(", ");
            for uuid in chunk {
                separated.push_bind(uuid.clone());
            }
            separated.push_unseparated(")");

            let found: Vec<String> = builder
                .build_query_scalar()
                .fetch_all(&mut *self.tx)
                .await
                .map_err(EngineError::Database)?;
            existing.extend(found);
        }
        Ok(existing)
    }

    async fn delete_task_input(&mut self, uuid: &str) -> EngineResult<()> {
        sqlx::query("DELETE FROM task_inputs WHERE task_uuid = ?")
            .bind(uuid)
            .execute(&mut *self.tx)
            .await
            .map_err(EngineError::Database)?;
        Ok(())
    }

    async fn select_component_by_uuid(&mut self, uuid: &str) -> EngineResult<Option<ComponentMetadata>> {
        let row = sqlx::query(
            "SELECT uuid, component_key, name, organization_uuid FROM components WHERE uuid = ?",
        )
        .bind(uuid)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(EngineError::Database)?;

        row.as_ref().map(row_to_component).transpose()
    }

    async fn select_components_by_uuids(
        &mut self,
        uuids: &[String],
    ) -> EngineResult<Vec<ComponentMetadata>> {
        let mut components = Vec::with_capacity(uuids.len());
        for chunk in uuids.chunks(BATCH_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT uuid, component_key, name, organization_uuid FROM components WHERE uuid IN (",
            );
            let mut separated = builder.separated(", ");
            for uuid in chunk {
                separated.push_bind(uuid.clone());
            }
            separated.push_unseparated(")");

            let rows = builder
                .build()
                .fetch_all(&mut *self.tx)
                .await
                .map_err(EngineError::Database)?;
            for row in &rows {
                components.push(row_to_component(row)?);
            }
        }
        Ok(components)
    }

    async fn select_property(&mut self, key: &str) -> EngineResult<Option<String>> {
        let row = sqlx::query("SELECT text_value FROM internal_properties WHERE kee = ?")
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(EngineError::Database)?;

        match row {
            Some(row) => Ok(Some(row.try_get("text_value")?)),
            None => Ok(None),
        }
    }

    async fn save_property(&mut self, key: &str, value: &str) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO internal_properties (kee, text_value) VALUES (?, ?)
             ON CONFLICT(kee) DO UPDATE SET text_value = excluded.text_value",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *self.tx)
        .await
        .map_err(EngineError::Database)?;
        Ok(())
    }

    async fn delete_property(&mut self, key: &str) -> EngineResult<()> {
        sqlx::query("DELETE FROM internal_properties WHERE kee = ?")
            .bind(key)
            .execute(&mut *self.tx)
            .await
            .map_err(EngineError::Database)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> EngineResult<()> {
        self.tx.commit().await.map_err(EngineError::Database)
    }

    async fn rollback(self: Box<Self>) -> EngineResult<()> {
        self.tx.rollback().await.map_err(EngineError::Database)
    }
}
