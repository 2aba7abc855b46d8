use thiserror::Error;

/// 计算引擎错误类型定义
///
/// 按照处理方式分为四类：
///
/// - 准入拒绝：提交入口被暂停 (`SubmitPaused`)
/// - 前置条件违反：调用方错误，不可重试
/// - 集群传输不可用：尽力而为的场景下只记录日志
/// - 持久化失败：原样传播给调用方
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Compute Engine does not currently accept new tasks")]
    SubmitPaused,

    #[error("Task is in progress and can't be canceled [uuid={uuid}]")]
    TaskInProgress { uuid: String },

    #[error("任务不在队列中或已不是PENDING状态: {uuid}")]
    TaskNotInQueue { uuid: String },

    #[error("任务已经结束，UUID不能再次提交: {uuid}")]
    TaskAlreadyFinished { uuid: String },

    #[error("非法的生命周期调用 {call}: 当前状态 {status}")]
    IllegalLifecycleTransition { call: &'static str, status: String },

    #[error("invalid call: broadcast_worker_uuids() must be called before get_worker_uuids()")]
    WorkerUuidsNotBroadcast,

    #[error("{field} can't be empty")]
    MissingField { field: &'static str },

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("集群通信错误: {0}")]
    Cluster(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl EngineError {
    /// 调用方错误：在错误的状态下调用了操作
    pub fn is_precondition_violation(&self) -> bool {
        matches!(
            self,
            EngineError::TaskInProgress { .. }
                | EngineError::TaskNotInQueue { .. }
                | EngineError::TaskAlreadyFinished { .. }
                | EngineError::IllegalLifecycleTransition { .. }
                | EngineError::WorkerUuidsNotBroadcast
                | EngineError::MissingField { .. }
        )
    }

    pub fn is_admission_rejected(&self) -> bool {
        matches!(self, EngineError::SubmitPaused)
    }

    pub fn is_transport_unavailable(&self) -> bool {
        matches!(self, EngineError::Cluster(_))
    }
}

impl From<redis::RedisError> for EngineError {
    fn from(e: redis::RedisError) -> Self {
        EngineError::Cluster(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type EngineResult<T> = std::result::Result<T, EngineError>;
