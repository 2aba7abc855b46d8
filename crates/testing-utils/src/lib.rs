//! # Compute Engine Testing Utils
//!
//! 工作区内各crate共享的测试工具：
//!
//! - **InMemoryTaskStore**: 带调用计数的内存事务存储
//! - **Builders**: 队列记录与组件元数据的测试数据构建器
//! - **Containers**: Redis 测试容器（需要 Docker）
//! - **Helpers**: 异步条件等待
//!
//! ```toml
//! [dev-dependencies]
//! engine-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod containers;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use containers::*;
pub use helpers::*;
pub use mocks::*;
