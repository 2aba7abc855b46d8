//! # Compute Engine
//!
//! 计算引擎任务队列服务：持久化任务队列、Worker身份登记、集群内唯一的队列清理，
//! 以及驱动这些组件的生命周期状态机。

pub mod app;
pub mod lifecycle;
pub mod shutdown;
pub mod workers;

pub use app::EngineContainer;
pub use lifecycle::{ComputeEngineContainer, EngineLifecycle, EngineStatus};
pub use shutdown::{wait_for_shutdown_signal, ShutdownManager};
pub use workers::WorkerPool;
