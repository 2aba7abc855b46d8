//! 集群成员关系、复制映射与分布式锁的实现
//!
//! - `in_memory`: 进程内集群，单进程部署与测试使用
//! - `redis_cluster`: 基于Redis的多节点集群

pub mod in_memory;
pub mod redis_cluster;

pub use in_memory::{InMemoryCluster, InMemoryClusterMember};
pub use redis_cluster::RedisClusterMembership;
