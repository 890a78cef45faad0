//! Common test utilities for server integration tests.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use registrar_catalog::{CatalogSettings, Controller, MemoryStorage, Storage};
use registrar_server::api::{router, AppState};
use serde_json::Value;
use tower::ServiceExt;

pub const CATALOG_ID: &str = "registrar-test";

/// Controller on in-memory storage with the API state wrapped around it.
pub struct TestServer {
    pub controller: Arc<Controller>,
    pub app_state: Arc<AppState>,
}

impl TestServer {
    pub async fn new() -> Self {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let controller = Controller::new(storage, CatalogSettings::default())
            .await
            .unwrap();

        let app_state = Arc::new(AppState {
            controller: Arc::clone(&controller),
            id: CATALOG_ID.to_string(),
            description: "Test Registrar".to_string(),
        });

        Self {
            controller,
            app_state,
        }
    }

    /// Sends one request through a fresh router.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router(self.app_state.clone())
            .oneshot(request)
            .await
            .unwrap();
        TestResponse::read(response).await
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.request(Method::DELETE, uri, None).await
    }

    /// Sends a request with a raw, possibly malformed, body.
    pub async fn send_raw(&self, method: Method, uri: &str, body: &'static str) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = router(self.app_state.clone())
            .oneshot(request)
            .await
            .unwrap();
        TestResponse::read(response).await
    }
}

/// A fully read response.
pub struct TestResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: Value,
}

impl TestResponse {
    async fn read(response: Response<Body>) -> Self {
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        Self {
            status,
            location,
            body,
        }
    }

    /// IDs of the services in a collection response, in order.
    pub fn ids(&self) -> Vec<String> {
        self.body["services"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_str().unwrap().to_string())
            .collect()
    }
}
