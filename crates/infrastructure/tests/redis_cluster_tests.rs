use anyhow::Result;
use engine_core::config::ClusterConfig;
use engine_domain::ClusterMembership;
use engine_infrastructure::cluster::RedisClusterMembership;
use engine_testing_utils::RedisTestContainer;
use std::collections::HashSet;
use std::time::Duration;

fn cluster_config(url: &str, prefix: &str) -> ClusterConfig {
    ClusterConfig {
        enabled: true,
        redis_url: Some(url.to_string()),
        key_prefix: prefix.to_string(),
        ..ClusterConfig::default()
    }
}

#[tokio::test]
#[ignore] // Ignore by default since it requires Docker
async fn test_redis_membership_map_and_lock() -> Result<()> {
    let redis = RedisTestContainer::new().await?;
    let config = cluster_config(&redis.url, "ce-test");

    let node1 = RedisClusterMembership::connect(&config, "node-1").await?;
    let node2 = RedisClusterMembership::connect(&config, "node-2").await?;

    let members = node1.current_member_ids().await?;
    assert!(members.contains("node-1"));
    assert!(members.contains("node-2"));

    node1
        .replicated_map("worker_uuids")
        .put("node-1", HashSet::from(["w1".to_string(), "w2".to_string()]))
        .await?;
    node2
        .replicated_map("worker_uuids")
        .put("node-2", HashSet::from(["w3".to_string()]))
        .await?;

    let entries = node1.replicated_map("worker_uuids").entries().await?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries["node-2"], HashSet::from(["w3".to_string()]));

    node2.leave().await?;
    assert!(!node1.current_member_ids().await?.contains("node-2"));
    // 节点离开后条目仍在，由读者按成员过滤
    assert_eq!(node1.replicated_map("worker_uuids").entries().await?.len(), 2);

    let lock1 = node1.distributed_lock("clean_job");
    let lock2 = node2.distributed_lock("clean_job");
    assert!(lock1.try_lock(Duration::ZERO).await?);
    assert!(!lock2.try_lock(Duration::from_millis(150)).await?);
    assert!(lock2.unlock().await.is_err());
    lock1.unlock().await?;
    assert!(lock2.try_lock(Duration::ZERO).await?);
    lock2.unlock().await?;

    Ok(())
}

#[tokio::test]
#[ignore] // Ignore by default since it requires Docker
async fn test_redis_lock_is_renewed_while_held() -> Result<()> {
    let redis = RedisTestContainer::new().await?;
    let config = ClusterConfig {
        member_ttl_seconds: 1,
        ..cluster_config(&redis.url, "ce-lease")
    };

    let node1 = RedisClusterMembership::connect(&config, "node-1").await?;
    let node2 = RedisClusterMembership::connect(&config, "node-2").await?;
    let lock1 = node1.distributed_lock("clean_job");
    let lock2 = node2.distributed_lock("clean_job");

    assert!(lock1.try_lock(Duration::ZERO).await?);
    // 持有时间超过租约，锁仍不能被其他节点拿到
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!lock2.try_lock(Duration::ZERO).await?);

    lock1.unlock().await?;
    assert!(lock2.try_lock(Duration::ZERO).await?);
    lock2.unlock().await?;

    Ok(())
}
