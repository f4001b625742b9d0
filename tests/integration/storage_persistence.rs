//! Data survives a reopen of the database file

use std::sync::Arc;

use chrono::{Duration, Utc};
use inframirror::actors::retention::RetentionHandle;
use inframirror::model::{
    Actor, HeartbeatType, Instance, InstanceSample, NewInstance, NewInstanceHeartbeat, NewRegion, PageRequest, Region,
    StatusThresholds,
};
use inframirror::search::SearchMode;
use inframirror::services::Services;
use inframirror::storage::{HeartbeatStore, Repository, SqliteBackend, StorageBackend};
use tokio::sync::broadcast;

fn services(storage: Arc<SqliteBackend>) -> Services {
    let (events, _) = broadcast::channel(16);
    Services::new(storage, events, StatusThresholds::default())
}

#[tokio::test]
async fn test_inventory_and_search_index_survive_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("hub.db");

    let region_id = {
        let storage = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
        let services = services(storage.clone());
        let mut fields = NewRegion::named("Frankfurt");
        fields.region_code = Some("eu-central".to_string());
        let region: Region = services.inventory.create(fields, &Actor::system()).await.unwrap();
        storage.close().await.unwrap();
        region.id
    };

    let storage = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
    let services = services(storage.clone());

    let region: Region = services.inventory.get(region_id).await.unwrap();
    assert_eq!(region.fields.name, "Frankfurt");
    assert_eq!(region.fields.region_code.as_deref(), Some("eu-central"));

    let found: inframirror::model::Page<Region> = services
        .inventory
        .search("frankfurt", SearchMode::FullText, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(found.total, 1);
    assert_eq!(found.items[0].id, region_id);

    // the create was audited in the first session
    let trail = services.audit.list(PageRequest::default()).await.unwrap();
    assert_eq!(trail.total, 1);
}

#[tokio::test]
async fn test_retention_cleanup_only_drops_expired_heartbeats() {
    let temp_dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(SqliteBackend::new(temp_dir.path().join("hub.db")).await.unwrap());

    let instance: Instance = storage
        .insert(NewInstance::new("db-1", "db-1.internal", "VM", "AGENT"))
        .await
        .unwrap();
    for days_ago in [45, 10, 0] {
        storage
            .insert_instance_heartbeat(NewInstanceHeartbeat {
                executed_at: Some(Utc::now() - Duration::days(days_ago)),
                sample: InstanceSample::new(instance.id, HeartbeatType::Hardware, true, "UP"),
            })
            .await
            .unwrap();
    }

    let stats = storage.get_stats().await.unwrap();
    assert_eq!(stats.instance_heartbeats, 3);
    assert!(stats.oldest_heartbeat.is_some());

    let retention = RetentionHandle::spawn(storage.clone(), 30, 24);
    assert_eq!(retention.cleanup_now().await.unwrap(), 1);

    let remaining = storage
        .list_instance_heartbeats(instance.id, None, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(remaining.total, 2);

    // the instance itself is untouched
    let kept: Option<Instance> = Repository::<Instance>::get(storage.as_ref(), instance.id).await.unwrap();
    assert!(kept.is_some());

    retention.shutdown().await;
}

#[tokio::test]
async fn test_health_check_reports_healthy_backend() {
    let temp_dir = tempfile::tempdir().unwrap();
    let storage = SqliteBackend::new(temp_dir.path().join("hub.db")).await.unwrap();

    let health = storage.health_check().await.unwrap();
    assert!(health.healthy);
}
