//! Integration tests for leases and the expiry sweep.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::fixtures::{RecordingListener, ServiceBuilder};
use common::TestCatalog;
use registrar_catalog::{CatalogSettings, Event, MemoryStorage, Storage};
use tokio::time::sleep;

#[tokio::test]
async fn expired_registration_is_removed_and_announced() {
    let catalog = TestCatalog::with_fast_reaper().await;
    let listener = Arc::new(RecordingListener::default());
    catalog.controller.add_listener(listener.clone()).await;

    catalog
        .controller
        .add(ServiceBuilder::new("short").with_ttl(1).build())
        .await
        .unwrap();

    sleep(Duration::from_millis(1500)).await;

    assert!(catalog
        .controller
        .get("short")
        .await
        .unwrap_err()
        .is_not_found());
    assert_eq!(catalog.controller.index_len().await, 0);

    let events = listener.wait_for(2).await;
    assert!(matches!(&events[1], Event::Deleted(s) if s.id == "short"));

    catalog.controller.stop().await.unwrap();
}

#[tokio::test]
async fn permanent_registration_survives_sweeps() {
    let catalog = TestCatalog::with_fast_reaper().await;
    catalog
        .controller
        .add(ServiceBuilder::new("forever").build())
        .await
        .unwrap();

    sleep(Duration::from_millis(200)).await;

    assert!(catalog.controller.get("forever").await.is_ok());
    catalog.controller.stop().await.unwrap();
}

#[tokio::test]
async fn shared_expiry_instant_keeps_both_entries() {
    // Two persisted leases ending at exactly the same instant
    let now = Utc::now();
    let storage = Arc::new(MemoryStorage::new());
    for id in ["a", "b"] {
        let mut service = ServiceBuilder::new(id).with_ttl(30).build();
        service.created = now;
        service.touch(now);
        storage.add(&service).await.unwrap();
    }
    let expires = storage.get("a").await.unwrap().expires.unwrap();
    assert_eq!(storage.get("b").await.unwrap().expires, Some(expires));

    let catalog = TestCatalog::on_storage(storage, CatalogSettings::default(), false).await;
    assert_eq!(catalog.controller.index_len().await, 2);

    // Deleting one leaves the other scheduled
    catalog.controller.delete("a").await.unwrap();
    assert_eq!(catalog.controller.index_len().await, 1);

    assert_eq!(catalog.controller.reap_expired(expires).await, 1);
    assert!(catalog.controller.get("b").await.unwrap_err().is_not_found());
    assert_eq!(catalog.controller.total().await.unwrap(), 0);
    assert_eq!(catalog.controller.index_len().await, 0);
}

#[tokio::test]
async fn renewal_moves_the_deadline() {
    let catalog = TestCatalog::new().await;
    let original = catalog
        .controller
        .add(ServiceBuilder::new("renewed").with_ttl(5).build())
        .await
        .unwrap();

    let renewed = catalog
        .controller
        .update("renewed", ServiceBuilder::new("renewed").with_ttl(50).build())
        .await
        .unwrap();

    assert!(renewed.expires.unwrap() > original.expires.unwrap());

    let after_old_deadline = original.expires.unwrap() + chrono::Duration::seconds(1);
    assert_eq!(catalog.controller.reap_expired(after_old_deadline).await, 0);
    assert!(catalog.controller.get("renewed").await.is_ok());

    let after_new_deadline = renewed.expires.unwrap();
    assert_eq!(catalog.controller.reap_expired(after_new_deadline).await, 1);
}

#[tokio::test]
async fn sweep_before_deadline_removes_nothing() {
    let catalog = TestCatalog::new().await;
    catalog
        .controller
        .add(ServiceBuilder::new("a").with_ttl(60).build())
        .await
        .unwrap();

    assert_eq!(catalog.controller.reap_expired(Utc::now()).await, 0);
    assert_eq!(catalog.controller.index_len().await, 1);
}
