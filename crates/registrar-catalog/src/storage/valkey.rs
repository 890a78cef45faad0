//! Valkey-backed service storage.
//!
//! Registrations are stored as JSON in one hash keyed by service ID. A sorted
//! set holding every ID with score zero provides lexicographic paging.

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{cmd, Script};

use crate::config::StorageConfig;
use crate::error::{CatalogError, Result};
use crate::service::Service;

use super::{page_window, Storage};

/// Valkey-backed service storage.
pub struct ValkeyStorage {
    pool: Pool,
    services_key: String,
    ids_key: String,
}

impl ValkeyStorage {
    /// Connects to Valkey and verifies the connection.
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        // Test connection
        let mut conn = pool.get().await?;
        let _: String = cmd("PING").query_async(&mut conn).await?;

        Ok(Self {
            pool,
            services_key: format!("{}services", config.key_prefix),
            ids_key: format!("{}ids", config.key_prefix),
        })
    }

    fn decode(json: &str) -> Result<Service> {
        Ok(serde_json::from_str(json)?)
    }
}

#[async_trait]
impl Storage for ValkeyStorage {
    async fn add(&self, service: &Service) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let json = serde_json::to_string(service)?;

        // Hash entry and ID set change together or not at all
        let script = Script::new(
            r#"
            if redis.call('HSETNX', KEYS[1], ARGV[1], ARGV[2]) == 0 then
                return 0
            end
            redis.call('ZADD', KEYS[2], 0, ARGV[1])
            return 1
            "#,
        );
        let inserted: i64 = script
            .key(&self.services_key)
            .key(&self.ids_key)
            .arg(&service.id)
            .arg(&json)
            .invoke_async(&mut conn)
            .await?;
        if inserted == 0 {
            return Err(CatalogError::conflict(&service.id));
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Service> {
        let mut conn = self.pool.get().await?;

        let data: Option<String> = cmd("HGET")
            .arg(&self.services_key)
            .arg(id)
            .query_async(&mut conn)
            .await?;

        match data {
            Some(json) => Self::decode(&json),
            None => Err(CatalogError::not_found(id)),
        }
    }

    async fn update(&self, id: &str, service: &Service) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let json = serde_json::to_string(service)?;

        let script = Script::new(
            r#"
            if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 0 then
                return 0
            end
            redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
            return 1
            "#,
        );
        let updated: i64 = script
            .key(&self.services_key)
            .arg(id)
            .arg(&json)
            .invoke_async(&mut conn)
            .await?;
        if updated == 0 {
            return Err(CatalogError::not_found(id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;

        let script = Script::new(
            r#"
            if redis.call('HDEL', KEYS[1], ARGV[1]) == 0 then
                return 0
            end
            redis.call('ZREM', KEYS[2], ARGV[1])
            return 1
            "#,
        );
        let removed: i64 = script
            .key(&self.services_key)
            .key(&self.ids_key)
            .arg(id)
            .invoke_async(&mut conn)
            .await?;
        if removed == 0 {
            return Err(CatalogError::not_found(id));
        }
        Ok(())
    }

    async fn list(&self, page: usize, per_page: usize) -> Result<(Vec<Service>, usize)> {
        let mut conn = self.pool.get().await?;

        let total: usize = cmd("ZCARD")
            .arg(&self.ids_key)
            .query_async(&mut conn)
            .await?;

        let (skip, take) = page_window(page, per_page);
        if take == 0 || skip >= total {
            return Ok((Vec::new(), total));
        }
        let start = i64::try_from(skip).map_err(|e| CatalogError::internal(e.to_string()))?;
        let stop = i64::try_from(skip.saturating_add(take) - 1)
            .map_err(|e| CatalogError::internal(e.to_string()))?;

        let ids: Vec<String> = cmd("ZRANGE")
            .arg(&self.ids_key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await?;
        if ids.is_empty() {
            return Ok((Vec::new(), total));
        }

        let bodies: Vec<Option<String>> = cmd("HMGET")
            .arg(&self.services_key)
            .arg(&ids)
            .query_async(&mut conn)
            .await?;

        let services = bodies
            .iter()
            .flatten()
            .map(|json| Self::decode(json))
            .collect::<Result<Vec<_>>>()?;
        Ok((services, total))
    }

    async fn total(&self) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        let total: usize = cmd("HLEN")
            .arg(&self.services_key)
            .query_async(&mut conn)
            .await?;
        Ok(total)
    }

    async fn iterate(&self) -> Result<Vec<Service>> {
        let mut conn = self.pool.get().await?;
        let bodies: Vec<String> = cmd("HVALS")
            .arg(&self.services_key)
            .query_async(&mut conn)
            .await?;

        bodies.iter().map(|json| Self::decode(json)).collect()
    }

    async fn close(&self) -> Result<()> {
        self.pool.close();
        Ok(())
    }
}

impl std::fmt::Debug for ValkeyStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValkeyStorage")
            .field("services_key", &self.services_key)
            .field("ids_key", &self.ids_key)
            .finish_non_exhaustive()
    }
}
