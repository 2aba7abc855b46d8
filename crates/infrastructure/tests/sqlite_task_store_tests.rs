use anyhow::Result;
use chrono::{Duration, Utc};
use engine_domain::{ActivityRecord, ActivityStatus, QueuedTaskStatus, TaskStore};
use engine_infrastructure::database::{DatabaseManager, SqliteTaskStore};
use engine_testing_utils::{component, QueuedTaskRecordBuilder};

async fn setup_store() -> Result<SqliteTaskStore> {
    let manager = DatabaseManager::in_memory().await?;
    Ok(SqliteTaskStore::new(manager.pool().clone()))
}

#[tokio::test]
async fn test_insert_and_select_queued_record() -> Result<()> {
    let store = setup_store().await?;
    let record = QueuedTaskRecordBuilder::new("T1")
        .with_component_uuid("C1")
        .with_execution_count(2)
        .build();

    let mut session = store.begin().await?;
    session.insert_queued(&record).await?;
    session.commit().await?;

    let mut session = store.begin().await?;
    let loaded = session.select_queued_by_uuid("T1").await?.unwrap();
    assert_eq!(loaded.uuid, "T1");
    assert_eq!(loaded.task_type, "foo");
    assert_eq!(loaded.component_uuid.as_deref(), Some("C1"));
    assert_eq!(loaded.status, QueuedTaskStatus::Pending);
    assert_eq!(loaded.execution_count, 2);
    assert_eq!(
        loaded.created_at.timestamp_millis(),
        record.created_at.timestamp_millis()
    );
    assert!(session.select_queued_by_uuid("missing").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_dropped_session_rolls_back() -> Result<()> {
    let store = setup_store().await?;

    let mut session = store.begin().await?;
    session
        .insert_queued(&QueuedTaskRecordBuilder::new("T1").build())
        .await?;
    drop(session);

    let mut session = store.begin().await?;
    assert!(session.select_queued_by_uuid("T1").await?.is_none());
    session.rollback().await?;

    Ok(())
}

#[tokio::test]
async fn test_duplicate_uuid_is_rejected() -> Result<()> {
    let store = setup_store().await?;

    let mut session = store.begin().await?;
    session
        .insert_queued(&QueuedTaskRecordBuilder::new("T1").build())
        .await?;
    let duplicate = session
        .insert_queued(&QueuedTaskRecordBuilder::new("T1").build())
        .await;
    assert!(duplicate.is_err());

    Ok(())
}

#[tokio::test]
async fn test_batch_insert_and_ascending_order() -> Result<()> {
    let store = setup_store().await?;
    let now = Utc::now();
    let records = vec![
        QueuedTaskRecordBuilder::new("T3")
            .with_created_at(now - Duration::seconds(1))
            .build(),
        QueuedTaskRecordBuilder::new("T1")
            .with_created_at(now - Duration::seconds(3))
            .build(),
        QueuedTaskRecordBuilder::new("T2")
            .with_created_at(now - Duration::seconds(2))
            .build(),
    ];

    let mut session = store.begin().await?;
    session.insert_queued_batch(&records).await?;
    session.commit().await?;

    let mut session = store.begin().await?;
    let uuids: Vec<String> = session
        .select_all_queued_ascending()
        .await?
        .into_iter()
        .map(|r| r.uuid)
        .collect();
    assert_eq!(uuids, vec!["T1", "T2", "T3"]);

    Ok(())
}

#[tokio::test]
async fn test_large_batch_insert() -> Result<()> {
    let store = setup_store().await?;
    let records: Vec<_> = (0..450)
        .map(|i| QueuedTaskRecordBuilder::new(&format!("T{i}")).build())
        .collect();

    let mut session = store.begin().await?;
    session.insert_queued_batch(&records).await?;
    assert_eq!(
        session
            .count_queued_by_status(QueuedTaskStatus::Pending)
            .await?,
        450
    );
    session.commit().await?;

    Ok(())
}

#[tokio::test]
async fn test_reset_to_pending_only_touches_in_progress() -> Result<()> {
    let store = setup_store().await?;

    let mut session = store.begin().await?;
    session
        .insert_queued(&QueuedTaskRecordBuilder::new("T1").in_progress("W1").build())
        .await?;
    session
        .insert_queued(&QueuedTaskRecordBuilder::new("T2").build())
        .await?;

    assert!(session.reset_to_pending("T1", Utc::now()).await?);
    assert!(!session.reset_to_pending("T2", Utc::now()).await?);
    assert!(!session.reset_to_pending("missing", Utc::now()).await?);

    let reset = session.select_queued_by_uuid("T1").await?.unwrap();
    assert_eq!(reset.status, QueuedTaskStatus::Pending);
    assert!(reset.worker_uuid.is_none());
    assert!(reset.started_at.is_none());

    Ok(())
}

#[tokio::test]
async fn test_count_pending_by_components() -> Result<()> {
    let store = setup_store().await?;

    let mut session = store.begin().await?;
    session
        .insert_queued_batch(&[
            QueuedTaskRecordBuilder::new("T1").with_component_uuid("C1").build(),
            QueuedTaskRecordBuilder::new("T2").with_component_uuid("C1").build(),
            QueuedTaskRecordBuilder::new("T3")
                .with_component_uuid("C2")
                .in_progress("W1")
                .build(),
            QueuedTaskRecordBuilder::new("T4").build(),
        ])
        .await?;

    let counts = session
        .count_pending_by_components(&["C1".to_string(), "C2".to_string(), "C3".to_string()])
        .await?;
    assert_eq!(counts.get("C1"), Some(&2));
    assert!(!counts.contains_key("C2"));
    assert!(!counts.contains_key("C3"));

    assert!(session.count_pending_by_components(&[]).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_component_lookups() -> Result<()> {
    let store = setup_store().await?;
    store
        .upsert_component(&component("C1", "project-1", "Project One", "org-1"))
        .await?;
    store
        .upsert_component(&component("C2", "project-2", "Project Two", "org-2"))
        .await?;
    store
        .upsert_component(&component("C1", "project-1", "Renamed", "org-1"))
        .await?;

    let mut session = store.begin().await?;
    let c1 = session.select_component_by_uuid("C1").await?.unwrap();
    assert_eq!(c1.name, "Renamed");
    assert_eq!(c1.organization_uuid, "org-1");

    let mut found = session
        .select_components_by_uuids(&["C2".to_string(), "C1".to_string(), "C9".to_string()])
        .await?;
    found.sort_by(|a, b| a.uuid.cmp(&b.uuid));
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].key, "project-1");
    assert_eq!(found[1].key, "project-2");

    assert!(session.select_components_by_uuids(&[]).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_activity_and_task_input() -> Result<()> {
    let store = setup_store().await?;
    store.insert_task_input("T1", b"report").await?;
    assert!(store.has_task_input("T1").await?);

    let record = QueuedTaskRecordBuilder::new("T1")
        .with_worker_uuid(Some("W1"))
        .with_execution_count(1)
        .build();

    let mut session = store.begin().await?;
    session.insert_queued(&record).await?;
    session
        .insert_activity(&ActivityRecord::from_queued(
            &record,
            ActivityStatus::Canceled,
            Utc::now(),
        ))
        .await?;
    assert!(session.delete_queued("T1").await?);
    assert!(!session.delete_queued("T1").await?);
    session.delete_task_input("T1").await?;
    session.commit().await?;

    assert!(!store.has_task_input("T1").await?);

    let mut session = store.begin().await?;
    let activity = session.select_activity_by_uuid("T1").await?.unwrap();
    assert_eq!(activity.status, ActivityStatus::Canceled);
    assert_eq!(activity.worker_uuid.as_deref(), Some("W1"));
    assert_eq!(activity.execution_count, 1);
    assert!(session.select_queued_by_uuid("T1").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_properties() -> Result<()> {
    let store = setup_store().await?;

    let mut session = store.begin().await?;
    assert!(session.select_property("ce.pause").await?.is_none());
    session.save_property("ce.pause", "true").await?;
    session.save_property("ce.pause", "yes").await?;
    assert_eq!(
        session.select_property("ce.pause").await?.as_deref(),
        Some("yes")
    );
    session.delete_property("ce.pause").await?;
    assert!(session.select_property("ce.pause").await?.is_none());

    Ok(())
}
