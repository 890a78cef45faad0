//! Service storage backends.
//!
//! The controller persists registrations through the [`Storage`] trait. An
//! in-memory implementation serves tests and single-process deployments; the
//! Valkey implementation keeps registrations across restarts.

mod memory;
mod valkey;

pub use memory::MemoryStorage;
pub use valkey::ValkeyStorage;

use async_trait::async_trait;

use crate::error::Result;
use crate::service::Service;

/// Backend for storing service registrations.
///
/// Listing order must be stable between calls so that consecutive pages do
/// not skip or repeat registrations. Both bundled backends order by ID.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert a new registration.
    ///
    /// Returns [`CatalogError::Conflict`](crate::CatalogError::Conflict) if
    /// the ID is taken.
    async fn add(&self, service: &Service) -> Result<()>;

    /// Get a registration by ID.
    async fn get(&self, id: &str) -> Result<Service>;

    /// Replace an existing registration.
    async fn update(&self, id: &str, service: &Service) -> Result<()>;

    /// Delete a registration.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Returns one page of registrations and the total count.
    ///
    /// Pages are 1-based; a page past the end is empty.
    async fn list(&self, page: usize, per_page: usize) -> Result<(Vec<Service>, usize)>;

    /// Returns the number of stored registrations.
    async fn total(&self) -> Result<usize>;

    /// Returns every stored registration.
    ///
    /// Used once at startup to rebuild the expiry index.
    async fn iterate(&self) -> Result<Vec<Service>>;

    /// Flushes and releases backend resources.
    async fn close(&self) -> Result<()>;
}

/// Converts a 1-based page into a `(skip, take)` pair.
pub(crate) fn page_window(page: usize, per_page: usize) -> (usize, usize) {
    (page.saturating_sub(1).saturating_mul(per_page), per_page)
}
