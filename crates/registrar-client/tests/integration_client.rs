//! Integration tests for the client against a live registrar API.

mod common;

use std::time::Duration;

use common::{fast_expiry, service, TestRegistrar, CATALOG_ID};
use registrar_catalog::Service;
use registrar_client::{register_and_keepalive, ClientError, FilterArgs, HttpClient};

#[tokio::test]
async fn ping_reports_healthy_registrar() {
    let registrar = TestRegistrar::start().await;

    registrar.client().ping().await.unwrap();
}

#[tokio::test]
async fn ping_fails_without_registrar() {
    let registrar = TestRegistrar::start().await;
    let client = HttpClient::new(&format!("{}/missing", registrar.endpoint)).unwrap();

    let err = client.ping().await.unwrap_err();

    assert!(err.is_not_found(), "{err}");
}

#[tokio::test]
async fn crud_round_trip() {
    let registrar = TestRegistrar::start().await;
    let client = registrar.client();

    let created = client
        .post(&Service::new("_http._tcp").with_ttl(60))
        .await
        .unwrap();
    assert!(!created.id.is_empty());
    assert!(created.expires.is_some());

    let fetched = client.get(&created.id).await.unwrap();
    assert_eq!(fetched, created);

    let updated = client
        .put(&fetched.clone().with_description("renewed"))
        .await
        .unwrap();
    assert_eq!(updated.description, "renewed");
    assert_eq!(updated.created, created.created);

    client.delete(&created.id).await.unwrap();
    assert!(client.get(&created.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn put_creates_missing_registration() {
    let registrar = TestRegistrar::start().await;

    let created = registrar.client().put(&service("fresh")).await.unwrap();

    assert_eq!(created.id, "fresh");
    assert_eq!(registrar.controller.get("fresh").await.unwrap().id, "fresh");
}

#[tokio::test]
async fn error_responses_map_to_variants() {
    let registrar = TestRegistrar::start().await;
    let client = registrar.client();
    client.put(&service("dup")).await.unwrap();

    let missing = client.get("missing").await.unwrap_err();
    assert!(matches!(missing, ClientError::NotFound(ref msg) if msg.contains("missing")));

    let invalid = client.put(&Service::new("").with_id("bad")).await;
    assert!(matches!(invalid, Err(ClientError::BadRequest(_))));

    assert!(client.delete("missing").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn list_pages_and_filters() {
    let registrar = TestRegistrar::start().await;
    let client = registrar.client();
    for i in 0..5 {
        client.put(&service(&format!("svc-{i}"))).await.unwrap();
    }
    client
        .put(
            &Service::new("_http._tcp")
                .with_id("web")
                .with_meta("url", "http://host/v1/items"),
        )
        .await
        .unwrap();

    let page = client.list(2, 2, None).await.unwrap();
    assert_eq!(page.id, CATALOG_ID);
    assert_eq!(page.page, 2);
    assert_eq!(page.per_page, 2);
    assert_eq!(page.total, 6);
    let ids: Vec<&str> = page.services.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["svc-2", "svc-3"]);

    let by_type = client
        .list(1, 10, Some(&FilterArgs::new("type", "equals", "_http._tcp")))
        .await
        .unwrap();
    assert_eq!(by_type.total, 1);
    assert_eq!(by_type.services[0].id, "web");

    // Values keep their slashes
    let by_meta = client
        .list(1, 10, Some(&FilterArgs::new("meta.url", "contains", "v1/items")))
        .await
        .unwrap();
    assert_eq!(by_meta.services.len(), 1);

    let err = client
        .list(1, 10, Some(&FilterArgs::new("type", "regex", ".*")))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::BadRequest(_)));
}

#[tokio::test]
async fn keepalive_outlives_the_lease() {
    let registrar = TestRegistrar::with_settings(fast_expiry()).await;
    let client = registrar.client();

    // Without renewal a one second lease lapses
    client.put(&service("plain").with_ttl(1)).await.unwrap();
    let keepalive = register_and_keepalive(client.clone(), service("kept").with_ttl(1))
        .await
        .unwrap();
    let first = keepalive.registered().clone();
    assert_eq!(first.id, "kept");

    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert!(client.get("plain").await.unwrap_err().is_not_found());
    let renewed = client.get("kept").await.unwrap();
    assert!(renewed.updated > first.updated);
    assert_eq!(renewed.created, first.created);

    keepalive.stop().await.unwrap();
    assert!(client.get("kept").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn keepalive_stop_tolerates_missing_registration() {
    let registrar = TestRegistrar::start().await;
    let client = registrar.client();

    let keepalive = register_and_keepalive(client.clone(), service("gone").with_ttl(60))
        .await
        .unwrap();
    client.delete("gone").await.unwrap();

    keepalive.stop().await.unwrap();
}

#[tokio::test]
async fn keepalive_surfaces_rejected_registration() {
    let registrar = TestRegistrar::start().await;

    let anonymous = register_and_keepalive(registrar.client(), Service::new("_x._tcp")).await;
    assert!(matches!(anonymous, Err(ClientError::InvalidRequest(_))));

    let untyped = register_and_keepalive(registrar.client(), Service::new("").with_id("x")).await;
    assert!(matches!(untyped, Err(ClientError::BadRequest(_))));
}
