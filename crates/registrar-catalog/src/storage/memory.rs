//! In-memory service storage.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{CatalogError, Result};
use crate::service::Service;

use super::{page_window, Storage};

/// In-memory service storage.
///
/// Registrations are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    services: RwLock<BTreeMap<String, Service>>,
}

impl MemoryStorage {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn add(&self, service: &Service) -> Result<()> {
        let mut services = self
            .services
            .write()
            .map_err(|_| CatalogError::internal("lock poisoned"))?;

        if services.contains_key(&service.id) {
            return Err(CatalogError::conflict(&service.id));
        }

        services.insert(service.id.clone(), service.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Service> {
        let services = self
            .services
            .read()
            .map_err(|_| CatalogError::internal("lock poisoned"))?;

        services
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found(id))
    }

    async fn update(&self, id: &str, service: &Service) -> Result<()> {
        let mut services = self
            .services
            .write()
            .map_err(|_| CatalogError::internal("lock poisoned"))?;

        let stored = services
            .get_mut(id)
            .ok_or_else(|| CatalogError::not_found(id))?;
        *stored = service.clone();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut services = self
            .services
            .write()
            .map_err(|_| CatalogError::internal("lock poisoned"))?;

        services
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CatalogError::not_found(id))
    }

    async fn list(&self, page: usize, per_page: usize) -> Result<(Vec<Service>, usize)> {
        let services = self
            .services
            .read()
            .map_err(|_| CatalogError::internal("lock poisoned"))?;

        let (skip, take) = page_window(page, per_page);
        let items = services.values().skip(skip).take(take).cloned().collect();
        Ok((items, services.len()))
    }

    async fn total(&self) -> Result<usize> {
        let services = self
            .services
            .read()
            .map_err(|_| CatalogError::internal("lock poisoned"))?;
        Ok(services.len())
    }

    async fn iterate(&self) -> Result<Vec<Service>> {
        let services = self
            .services
            .read()
            .map_err(|_| CatalogError::internal("lock poisoned"))?;
        Ok(services.values().cloned().collect())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
