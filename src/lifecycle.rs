//! 计算引擎生命周期状态机
//!
//! 状态只前进不后退：
//! `INIT -> STARTING -> STARTED -> STOPPING_WORKERS -> WORKERS_STOPPED -> STOPPING -> STOPPED`。
//! 每个调用都有显式的允许前置状态集合，与枚举的声明顺序无关。

use async_trait::async_trait;
use engine_core::{EngineError, EngineResult};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineStatus {
    Init,
    Starting,
    Started,
    StoppingWorkers,
    WorkersStopped,
    Stopping,
    Stopped,
}

impl EngineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineStatus::Init => "INIT",
            EngineStatus::Starting => "STARTING",
            EngineStatus::Started => "STARTED",
            EngineStatus::StoppingWorkers => "STOPPING_WORKERS",
            EngineStatus::WorkersStopped => "WORKERS_STOPPED",
            EngineStatus::Stopping => "STOPPING",
            EngineStatus::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const STARTUP_FROM: &[EngineStatus] = &[EngineStatus::Init];

const STOP_PROCESSING_FROM: &[EngineStatus] =
    &[EngineStatus::Started, EngineStatus::StoppingWorkers];

const SHUTDOWN_FROM: &[EngineStatus] = &[
    EngineStatus::Started,
    EngineStatus::StoppingWorkers,
    EngineStatus::WorkersStopped,
    EngineStatus::Stopping,
];

/// 生命周期管理的容器：队列、注册表与Worker池的所有者
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ComputeEngineContainer: Send + Sync {
    async fn start(&self) -> EngineResult<()>;

    /// 只停止Worker池，容器仍然可用
    async fn stop_workers(&self) -> EngineResult<()>;

    /// 停止整个容器并释放资源
    async fn stop(&self) -> EngineResult<()>;
}

pub struct EngineLifecycle {
    container: Arc<dyn ComputeEngineContainer>,
    status: RwLock<EngineStatus>,
}

impl EngineLifecycle {
    pub fn new(container: Arc<dyn ComputeEngineContainer>) -> Self {
        Self {
            container,
            status: RwLock::new(EngineStatus::Init),
        }
    }

    pub async fn status(&self) -> EngineStatus {
        *self.status.read().await
    }

    /// 启动容器。即使启动失败状态也会前进到 STARTED，错误返回给调用方。
    pub async fn startup(&self) -> EngineResult<()> {
        self.enter("startup", STARTUP_FROM, EngineStatus::Starting)
            .await?;
        info!("Compute Engine starting up...");

        let result = self.container.start().await;
        *self.status.write().await = EngineStatus::Started;

        match &result {
            Ok(()) => info!("Compute Engine is started"),
            Err(e) => error!("Compute Engine startup failed: {}", e),
        }
        result
    }

    pub async fn stop_processing(&self) -> EngineResult<()> {
        self.enter(
            "stop_processing",
            STOP_PROCESSING_FROM,
            EngineStatus::StoppingWorkers,
        )
        .await?;
        info!("Compute Engine stopping workers...");

        self.container.stop_workers().await?;
        *self.status.write().await = EngineStatus::WorkersStopped;

        info!("Compute Engine workers are stopped");
        Ok(())
    }

    pub async fn shutdown(&self) -> EngineResult<()> {
        self.enter("shutdown", SHUTDOWN_FROM, EngineStatus::Stopping)
            .await?;
        info!("Compute Engine shutting down...");

        self.container.stop().await?;
        *self.status.write().await = EngineStatus::Stopped;

        info!("Compute Engine is stopped");
        Ok(())
    }

    async fn enter(
        &self,
        call: &'static str,
        allowed: &[EngineStatus],
        next: EngineStatus,
    ) -> EngineResult<()> {
        let mut status = self.status.write().await;
        if !allowed.contains(&*status) {
            return Err(EngineError::IllegalLifecycleTransition {
                call,
                status: status.to_string(),
            });
        }
        *status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> MockComputeEngineContainer {
        let mut mock = MockComputeEngineContainer::new();
        mock.expect_start().returning(|| Ok(()));
        mock.expect_stop_workers().returning(|| Ok(()));
        mock.expect_stop().returning(|| Ok(()));
        mock
    }

    fn lifecycle(mock: MockComputeEngineContainer) -> EngineLifecycle {
        EngineLifecycle::new(Arc::new(mock))
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let mut mock = MockComputeEngineContainer::new();
        mock.expect_start().times(1).returning(|| Ok(()));
        mock.expect_stop_workers().times(1).returning(|| Ok(()));
        mock.expect_stop().times(1).returning(|| Ok(()));
        let lifecycle = lifecycle(mock);
        assert_eq!(lifecycle.status().await, EngineStatus::Init);

        lifecycle.startup().await.unwrap();
        assert_eq!(lifecycle.status().await, EngineStatus::Started);

        lifecycle.stop_processing().await.unwrap();
        assert_eq!(lifecycle.status().await, EngineStatus::WorkersStopped);

        lifecycle.shutdown().await.unwrap();
        assert_eq!(lifecycle.status().await, EngineStatus::Stopped);

        assert!(lifecycle.startup().await.is_err());
        assert!(lifecycle.stop_processing().await.is_err());
        assert!(lifecycle.shutdown().await.is_err());
        assert_eq!(lifecycle.status().await, EngineStatus::Stopped);
    }

    #[tokio::test]
    async fn test_startup_twice_fails() {
        let lifecycle = lifecycle(container());

        lifecycle.startup().await.unwrap();
        let err = lifecycle.startup().await.unwrap_err();

        assert!(err.is_precondition_violation());
        match err {
            EngineError::IllegalLifecycleTransition { call, status } => {
                assert_eq!(call, "startup");
                assert_eq!(status, "STARTED");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_stop_processing_before_startup_fails() {
        let mut mock = MockComputeEngineContainer::new();
        mock.expect_stop_workers().never();
        let lifecycle = lifecycle(mock);

        let err = lifecycle.stop_processing().await.unwrap_err();

        assert!(matches!(
            err,
            EngineError::IllegalLifecycleTransition {
                call: "stop_processing",
                ..
            }
        ));
        assert_eq!(lifecycle.status().await, EngineStatus::Init);
    }

    #[tokio::test]
    async fn test_shutdown_before_startup_fails() {
        let lifecycle = lifecycle(MockComputeEngineContainer::new());
        assert!(lifecycle.shutdown().await.is_err());
        assert_eq!(lifecycle.status().await, EngineStatus::Init);
    }

    #[tokio::test]
    async fn test_shutdown_twice_fails() {
        let lifecycle = lifecycle(container());
        lifecycle.startup().await.unwrap();

        lifecycle.shutdown().await.unwrap();
        let err = lifecycle.shutdown().await.unwrap_err();

        assert!(err.to_string().contains("shutdown"));
        assert!(err.to_string().contains("STOPPED"));
    }

    #[tokio::test]
    async fn test_shutdown_directly_after_startup() {
        let mut mock = MockComputeEngineContainer::new();
        mock.expect_start().returning(|| Ok(()));
        mock.expect_stop_workers().never();
        mock.expect_stop().times(1).returning(|| Ok(()));
        let lifecycle = lifecycle(mock);

        lifecycle.startup().await.unwrap();
        lifecycle.shutdown().await.unwrap();

        assert_eq!(lifecycle.status().await, EngineStatus::Stopped);
        assert!(lifecycle.stop_processing().await.is_err());
    }

    #[tokio::test]
    async fn test_failed_start_still_reaches_started() {
        let mut mock = MockComputeEngineContainer::new();
        mock.expect_start()
            .times(1)
            .returning(|| Err(EngineError::Internal("boom".to_string())));
        mock.expect_stop().times(1).returning(|| Ok(()));
        let lifecycle = lifecycle(mock);

        let err = lifecycle.startup().await.unwrap_err();

        assert!(matches!(err, EngineError::Internal(_)));
        assert_eq!(lifecycle.status().await, EngineStatus::Started);
        lifecycle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_worker_stop_can_be_retried() {
        let mut mock = MockComputeEngineContainer::new();
        mock.expect_start().returning(|| Ok(()));
        let mut attempts = 0;
        mock.expect_stop_workers().times(2).returning(move || {
            attempts += 1;
            if attempts == 1 {
                Err(EngineError::Internal("busy".to_string()))
            } else {
                Ok(())
            }
        });
        let lifecycle = lifecycle(mock);
        lifecycle.startup().await.unwrap();

        assert!(lifecycle.stop_processing().await.is_err());
        assert_eq!(lifecycle.status().await, EngineStatus::StoppingWorkers);

        lifecycle.stop_processing().await.unwrap();
        assert_eq!(lifecycle.status().await, EngineStatus::WorkersStopped);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(EngineStatus::StoppingWorkers.to_string(), "STOPPING_WORKERS");
        assert_eq!(EngineStatus::Init.to_string(), "INIT");
    }
}
