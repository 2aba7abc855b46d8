//! # Compute Engine Dispatcher
//!
//! 任务队列与Worker协调：
//!
//! - [`TaskQueue`]: 提交、批量提交、取消，以及提交入口的暂停/恢复
//! - [`SubmitGate`]: 每个队列实例自己的提交开关
//! - [`DistributedWorkerRegistry`]: 集群/单节点的Worker身份登记和清理任务锁
//! - [`CleaningJob`]: 取消多次执行的任务，回收失联Worker持有的任务

pub mod cleaning;
pub mod queue;
pub mod registry;
pub mod submit_gate;
pub mod task_builder;

pub use cleaning::{CleaningJob, CleaningReport};
pub use queue::{TaskQueue, PAUSE_PROPERTY_KEY};
pub use registry::{ClusteredWorkerRegistry, DistributedWorkerRegistry, StandaloneWorkerRegistry};
pub use submit_gate::SubmitGate;
pub use task_builder::build_task;
