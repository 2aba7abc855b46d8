//! 计算引擎任务队列
//!
//! 负责任务的提交、取消与提交入口的暂停/恢复。每个公开操作都打开自己的事务会话，
//! 单个提交和单个取消在一个会话内完成并一次提交；`mass_submit` 整批共用一个会话。

use chrono::Utc;
use engine_core::{EngineError, EngineResult};
use engine_domain::{
    ActivityRecord, ActivityStatus, ComponentMetadata, QueuedTaskRecord, QueuedTaskStatus,
    StoreSession, SubmitOption, Task, TaskStore, TaskSubmission, TaskSubmissionBuilder,
    WorkersPauseStatus,
};
use metrics::counter;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::submit_gate::SubmitGate;
use crate::task_builder::build_task;

/// Worker暂停标志在内部属性表中的键
pub const PAUSE_PROPERTY_KEY: &str = "ce.pause";

pub struct TaskQueue {
    store: Arc<dyn TaskStore>,
    submit_gate: SubmitGate,
    default_organization_uuid: String,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn TaskStore>, default_organization_uuid: impl Into<String>) -> Self {
        Self {
            store,
            submit_gate: SubmitGate::new(),
            default_organization_uuid: default_organization_uuid.into(),
        }
    }

    /// 以新生成的UUID开始构建一次提交
    pub fn prepare_submission(&self) -> TaskSubmissionBuilder {
        TaskSubmission::builder(Uuid::new_v4().to_string())
    }

    #[instrument(skip(self, submission), fields(task.uuid = %submission.uuid()))]
    pub async fn submit(&self, submission: TaskSubmission) -> EngineResult<Task> {
        self.check_submit_gate()?;

        let mut session = self.store.begin().await?;
        let task = self.submit_in_session(session.as_mut(), &submission).await?;
        session.commit().await?;

        counter!("ce_tasks_submitted_total").increment(1);
        debug!("任务已入队: {} ({})", task.uuid(), task.task_type());
        Ok(task)
    }

    /// 按选项提交。被 `UniqueQueuePerComponent` 过滤掉时返回 `None`，不创建任何记录。
    #[instrument(skip(self, submission), fields(task.uuid = %submission.uuid()))]
    pub async fn submit_with_options(
        &self,
        submission: TaskSubmission,
        options: &[SubmitOption],
    ) -> EngineResult<Option<Task>> {
        self.check_submit_gate()?;

        let mut session = self.store.begin().await?;
        if options.contains(&SubmitOption::UniqueQueuePerComponent) {
            if let Some(component_uuid) = submission.component_uuid() {
                let pending = session
                    .count_pending_by_components(&[component_uuid.to_string()])
                    .await?;
                if pending.get(component_uuid).copied().unwrap_or(0) > 0 {
                    debug!("组件 {} 已有排队任务，跳过提交", component_uuid);
                    return Ok(None);
                }
            }
        }

        let task = self.submit_in_session(session.as_mut(), &submission).await?;
        session.commit().await?;

        counter!("ce_tasks_submitted_total").increment(1);
        Ok(Some(task))
    }

    /// 批量提交，返回的任务与输入顺序一致
    pub async fn mass_submit(&self, submissions: Vec<TaskSubmission>) -> EngineResult<Vec<Task>> {
        self.check_submit_gate()?;
        if submissions.is_empty() {
            return Ok(Vec::new());
        }
        self.mass_submit_impl(submissions, false).await
    }

    pub async fn mass_submit_with_options(
        &self,
        submissions: Vec<TaskSubmission>,
        options: &[SubmitOption],
    ) -> EngineResult<Vec<Task>> {
        self.check_submit_gate()?;
        if submissions.is_empty() {
            return Ok(Vec::new());
        }
        let unique_per_component = options.contains(&SubmitOption::UniqueQueuePerComponent);
        self.mass_submit_impl(submissions, unique_per_component).await
    }

    /// 取消一个PENDING任务：写入CANCELED终态记录，删除队列记录和任务输入
    #[instrument(skip(self, record), fields(task.uuid = %record.uuid))]
    pub async fn cancel(&self, record: &QueuedTaskRecord) -> EngineResult<()> {
        if !record.is_pending() {
            return Err(EngineError::TaskInProgress {
                uuid: record.uuid.clone(),
            });
        }

        let mut session = self.store.begin().await?;
        let current = session
            .select_queued_by_uuid(&record.uuid)
            .await?
            .ok_or_else(|| EngineError::TaskNotInQueue {
                uuid: record.uuid.clone(),
            })?;
        if current.is_in_progress() {
            return Err(EngineError::TaskInProgress { uuid: current.uuid });
        }

        cancel_impl(session.as_mut(), &current).await?;
        session.commit().await?;

        counter!("ce_tasks_canceled_total").increment(1);
        info!("任务已取消: {}", record.uuid);
        Ok(())
    }

    /// 按创建时间升序取消全部任务，`include_in_progress` 为假时跳过执行中的任务。
    ///
    /// 每个任务单独提交：中途失败时，之前的取消已经生效。
    pub async fn cancel_all(&self, include_in_progress: bool) -> EngineResult<usize> {
        let canceled = self
            .cancel_matching(|record| include_in_progress || !record.is_in_progress())
            .await?;
        info!("批量取消任务完成: {} 个", canceled);
        Ok(canceled)
    }

    /// 取消已被Worker领取过又放回队列的PENDING任务
    pub async fn cancel_worn_outs(&self) -> EngineResult<usize> {
        let canceled = self
            .cancel_matching(|record| record.is_pending() && record.execution_count >= 1)
            .await?;
        if canceled > 0 {
            info!("已取消 {} 个多次执行的任务", canceled);
        }
        Ok(canceled)
    }

    /// 把Worker不在 `known_worker_uuids` 中的执行中任务放回PENDING
    pub async fn reset_tasks_with_unknown_worker_uuids(
        &self,
        known_worker_uuids: &HashSet<String>,
    ) -> EngineResult<usize> {
        let mut session = self.store.begin().await?;
        let records = session.select_all_queued_ascending().await?;
        let now = Utc::now();

        let mut reset = 0;
        for record in records.iter().filter(|r| r.is_in_progress()) {
            let known = record
                .worker_uuid
                .as_ref()
                .is_some_and(|worker| known_worker_uuids.contains(worker));
            if known {
                continue;
            }
            if session.reset_to_pending(&record.uuid, now).await? {
                warn!(
                    task.uuid = %record.uuid,
                    worker.uuid = record.worker_uuid.as_deref().unwrap_or("-"),
                    "任务的Worker已不存在，放回队列"
                );
                reset += 1;
            }
        }
        session.commit().await?;

        counter!("ce_tasks_reset_total").increment(reset as u64);
        Ok(reset)
    }

    pub fn pause_submit(&self) {
        self.submit_gate.pause();
        info!("Compute Engine 暂停接受新任务");
    }

    pub fn resume_submit(&self) {
        self.submit_gate.resume();
        info!("Compute Engine 恢复接受新任务");
    }

    pub fn is_submit_paused(&self) -> bool {
        self.submit_gate.is_paused()
    }

    /// 请求所有节点的Worker暂停领取任务
    pub async fn pause_workers(&self) -> EngineResult<()> {
        let mut session = self.store.begin().await?;
        session.save_property(PAUSE_PROPERTY_KEY, "true").await?;
        session.commit().await
    }

    pub async fn resume_workers(&self) -> EngineResult<()> {
        let mut session = self.store.begin().await?;
        session.delete_property(PAUSE_PROPERTY_KEY).await?;
        session.commit().await
    }

    pub async fn workers_pause_status(&self) -> EngineResult<WorkersPauseStatus> {
        let mut session = self.store.begin().await?;
        if session.select_property(PAUSE_PROPERTY_KEY).await?.is_none() {
            return Ok(WorkersPauseStatus::Resumed);
        }
        let in_progress = session
            .count_queued_by_status(QueuedTaskStatus::InProgress)
            .await?;
        if in_progress > 0 {
            Ok(WorkersPauseStatus::Pausing)
        } else {
            Ok(WorkersPauseStatus::Paused)
        }
    }

    fn check_submit_gate(&self) -> EngineResult<()> {
        if self.submit_gate.is_paused() {
            counter!("ce_submit_rejected_total").increment(1);
            return Err(EngineError::SubmitPaused);
        }
        Ok(())
    }

    async fn submit_in_session(
        &self,
        session: &mut dyn StoreSession,
        submission: &TaskSubmission,
    ) -> EngineResult<Task> {
        reject_finished_uuids(session, &[submission.uuid().to_string()]).await?;

        let record = new_queued_record(submission, Utc::now());
        session.insert_queued(&record).await?;

        let mut components = HashMap::new();
        if let Some(component_uuid) = &record.component_uuid {
            if let Some(component) = session.select_component_by_uuid(component_uuid).await? {
                components.insert(component.uuid.clone(), component);
            }
        }

        build_task(&record, &self.default_organization_uuid, &components)
    }

    async fn mass_submit_impl(
        &self,
        submissions: Vec<TaskSubmission>,
        unique_per_component: bool,
    ) -> EngineResult<Vec<Task>> {
        let mut session = self.store.begin().await?;

        let submissions = if unique_per_component {
            filter_components_with_pending_tasks(session.as_mut(), submissions).await?
        } else {
            submissions
        };
        if submissions.is_empty() {
            return Ok(Vec::new());
        }

        let uuids: Vec<String> = submissions.iter().map(|s| s.uuid().to_string()).collect();
        reject_finished_uuids(session.as_mut(), &uuids).await?;

        let now = Utc::now();
        let records: Vec<QueuedTaskRecord> = submissions
            .iter()
            .map(|submission| new_queued_record(submission, now))
            .collect();
        session.insert_queued_batch(&records).await?;

        let components = load_components(session.as_mut(), &records).await?;
        let tasks = records
            .iter()
            .map(|record| build_task(record, &self.default_organization_uuid, &components))
            .collect::<EngineResult<Vec<_>>>()?;
        session.commit().await?;

        counter!("ce_tasks_submitted_total").increment(tasks.len() as u64);
        debug!("批量入队 {} 个任务", tasks.len());
        Ok(tasks)
    }

    /// 逐个取消满足条件的记录，每个记录在自己的会话中重新读取并提交
    async fn cancel_matching<F>(&self, matches: F) -> EngineResult<usize>
    where
        F: Fn(&QueuedTaskRecord) -> bool,
    {
        let records = {
            let mut session = self.store.begin().await?;
            session.select_all_queued_ascending().await?
        };

        let mut canceled = 0;
        for record in records.iter().filter(|r| matches(*r)) {
            let mut session = self.store.begin().await?;
            let current = match session.select_queued_by_uuid(&record.uuid).await? {
                Some(current) if matches(&current) => current,
                _ => continue,
            };
            cancel_impl(session.as_mut(), &current).await?;
            session.commit().await?;

            counter!("ce_tasks_canceled_total").increment(1);
            canceled += 1;
        }
        Ok(canceled)
    }
}

/// 已经有终态记录的UUID不能再次入队
async fn reject_finished_uuids(session: &mut dyn StoreSession, uuids: &[String]) -> EngineResult<()> {
    let finished = session.select_existing_activity_uuids(uuids).await?;
    match finished.into_iter().next() {
        Some(uuid) => Err(EngineError::TaskAlreadyFinished { uuid }),
        None => Ok(()),
    }
}

fn new_queued_record(submission: &TaskSubmission, now: chrono::DateTime<Utc>) -> QueuedTaskRecord {
    QueuedTaskRecord {
        uuid: submission.uuid().to_string(),
        task_type: submission.task_type().to_string(),
        component_uuid: submission.component_uuid().map(str::to_string),
        status: QueuedTaskStatus::Pending,
        submitter_login: submission.submitter_login().map(str::to_string),
        worker_uuid: None,
        execution_count: 0,
        created_at: now,
        updated_at: now,
        started_at: None,
    }
}

async fn cancel_impl(session: &mut dyn StoreSession, record: &QueuedTaskRecord) -> EngineResult<()> {
    let activity = ActivityRecord::from_queued(record, ActivityStatus::Canceled, Utc::now());
    session.insert_activity(&activity).await?;
    if !session.delete_queued(&record.uuid).await? {
        return Err(EngineError::TaskNotInQueue {
            uuid: record.uuid.clone(),
        });
    }
    session.delete_task_input(&record.uuid).await
}

/// 一次查询解析所有记录引用的组件
async fn load_components(
    session: &mut dyn StoreSession,
    records: &[QueuedTaskRecord],
) -> EngineResult<HashMap<String, ComponentMetadata>> {
    let component_uuids: Vec<String> = records
        .iter()
        .filter_map(|r| r.component_uuid.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if component_uuids.is_empty() {
        return Ok(HashMap::new());
    }

    Ok(session
        .select_components_by_uuids(&component_uuids)
        .await?
        .into_iter()
        .map(|component| (component.uuid.clone(), component))
        .collect())
}

/// 去掉组件已有PENDING任务的提交。只看已入队的任务，同一批内的重复组件都保留。
async fn filter_components_with_pending_tasks(
    session: &mut dyn StoreSession,
    submissions: Vec<TaskSubmission>,
) -> EngineResult<Vec<TaskSubmission>> {
    let component_uuids: Vec<String> = submissions
        .iter()
        .filter_map(|s| s.component_uuid().map(str::to_string))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if component_uuids.is_empty() {
        return Ok(submissions);
    }

    let pending = session.count_pending_by_components(&component_uuids).await?;
    Ok(submissions
        .into_iter()
        .filter(|submission| match submission.component_uuid() {
            Some(component_uuid) => pending.get(component_uuid).copied().unwrap_or(0) == 0,
            None => true,
        })
        .collect())
}
