//! Common test utilities for client integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use registrar_catalog::{CatalogSettings, Controller, MemoryStorage, Service, Storage};
use registrar_client::HttpClient;
use registrar_server::api::{router, AppState};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const CATALOG_ID: &str = "registrar-test";

/// Registrar API served on an ephemeral local port.
pub struct TestRegistrar {
    pub controller: Arc<Controller>,
    pub endpoint: String,
    server: JoinHandle<()>,
}

impl TestRegistrar {
    pub async fn start() -> Self {
        Self::with_settings(CatalogSettings::default()).await
    }

    /// Runs the expiry sweep as configured, so leases lapse in real time.
    pub async fn with_settings(settings: CatalogSettings) -> Self {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let controller = Controller::start(storage, settings).await.unwrap();

        let state = Arc::new(AppState {
            controller: Arc::clone(&controller),
            id: CATALOG_ID.to_string(),
            description: "Test Registrar".to_string(),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let app = router(state);
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            controller,
            endpoint,
            server,
        }
    }

    pub fn client(&self) -> HttpClient {
        HttpClient::with_timeout(&self.endpoint, Duration::from_secs(5)).unwrap()
    }
}

impl Drop for TestRegistrar {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Settings that sweep expired leases every 100ms.
pub fn fast_expiry() -> CatalogSettings {
    CatalogSettings {
        reaper_interval: Duration::from_millis(100),
        ..CatalogSettings::default()
    }
}

pub fn service(id: &str) -> Service {
    Service::new("_test._tcp").with_id(id)
}
