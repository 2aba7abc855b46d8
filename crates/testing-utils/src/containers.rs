//! Test container utilities for integration testing

use anyhow::Result;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::redis::Redis;

/// Redis test container，用于集群成员关系与分布式锁的集成测试
pub struct RedisTestContainer {
    #[allow(dead_code)]
    container: ContainerAsync<Redis>,
    pub url: String,
}

impl RedisTestContainer {
    pub async fn new() -> Result<Self> {
        let container = Redis::default().start().await?;
        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(6379).await?;

        Ok(Self {
            container,
            url: format!("redis://{host}:{port}"),
        })
    }
}
