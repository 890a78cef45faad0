//! Common test utilities for catalog integration tests.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use registrar_catalog::{CatalogSettings, Controller, MemoryStorage, Storage};

/// Controller wired to in-memory storage.
pub struct TestCatalog {
    pub storage: Arc<MemoryStorage>,
    pub controller: Arc<Controller>,
}

impl TestCatalog {
    /// Creates a catalog without a running expiry sweep.
    pub async fn new() -> Self {
        Self::with_settings(CatalogSettings::default(), false).await
    }

    /// Creates a catalog whose expiry sweep runs every 50ms.
    pub async fn with_fast_reaper() -> Self {
        let settings = CatalogSettings {
            reaper_interval: Duration::from_millis(50),
            ..CatalogSettings::default()
        };
        Self::with_settings(settings, true).await
    }

    /// Creates a catalog with custom settings.
    pub async fn with_settings(settings: CatalogSettings, start: bool) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        Self::on_storage(storage, settings, start).await
    }

    /// Creates a catalog over an existing store.
    pub async fn on_storage(
        storage: Arc<MemoryStorage>,
        settings: CatalogSettings,
        start: bool,
    ) -> Self {
        let backend: Arc<dyn Storage> = storage.clone();
        let controller = if start {
            Controller::start(backend, settings).await.unwrap()
        } else {
            Controller::new(backend, settings).await.unwrap()
        };
        Self {
            storage,
            controller,
        }
    }
}
