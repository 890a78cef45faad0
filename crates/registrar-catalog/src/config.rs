//! Configuration types for the catalog.

use serde::Deserialize;
use std::time::Duration;

use crate::error::{CatalogError, Result};

/// Catalog policy configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Maximum lease a registration may request, in seconds.
    pub max_ttl: u32,
    /// Interval between expiry sweeps.
    #[serde(with = "serde_duration_secs")]
    pub reaper_interval: Duration,
    /// Capacity of each listener's event queue.
    pub notification_queue: usize,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            max_ttl: 31_536_000,
            reaper_interval: Duration::from_secs(5),
            notification_queue: 1024,
        }
    }
}

impl CatalogSettings {
    /// Validates the settings.
    pub fn validate(&self) -> Result<()> {
        if self.max_ttl == 0 {
            return Err(CatalogError::bad_request("catalog: max_ttl must be positive"));
        }
        if self.reaper_interval.is_zero() {
            return Err(CatalogError::bad_request(
                "catalog: reaper_interval must be positive",
            ));
        }
        if self.notification_queue == 0 {
            return Err(CatalogError::bad_request(
                "catalog: notification_queue must be positive",
            ));
        }
        Ok(())
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile in-process storage.
    #[default]
    Memory,
    /// Valkey/Redis-backed storage.
    Valkey,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend to use.
    pub backend: StorageBackend,
    /// Connection URL (Valkey only).
    pub url: String,
    /// Key prefix for all stored keys (Valkey only).
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            url: "redis://localhost:6379".to_owned(),
            key_prefix: "registrar:".to_owned(),
        }
    }
}

impl StorageConfig {
    /// Validates the storage configuration.
    pub fn validate(&self) -> Result<()> {
        if self.backend == StorageBackend::Valkey {
            url::Url::parse(&self.url).map_err(|e| {
                CatalogError::bad_request(format!("storage: url must be a valid URL: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Serde helper for Duration as seconds.
pub mod serde_duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
