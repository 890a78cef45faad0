//! Error types for the catalog.

use thiserror::Error;

/// Catalog errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Registration failed validation or the request was malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A registration with the same ID already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No registration with the given ID.
    #[error("not found: {0}")]
    NotFound(String),

    /// The controller has been stopped.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    /// Storage backend failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Valkey/Redis pool error.
    #[error("valkey error: {0}")]
    Valkey(#[from] deadpool_redis::PoolError),

    /// Redis command error.
    #[error("redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CatalogError {
    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a not found error for a service ID.
    #[must_use]
    pub fn not_found(id: &str) -> Self {
        Self::NotFound(format!("service {id} not found"))
    }

    /// Create a conflict error for a service ID.
    #[must_use]
    pub fn conflict(id: &str) -> Self {
        Self::Conflict(format!("service {id} already exists"))
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true for [`CatalogError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true for [`CatalogError::Conflict`].
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns true for [`CatalogError::BadRequest`].
    #[must_use]
    pub const fn is_bad_request(&self) -> bool {
        matches!(self, Self::BadRequest(_))
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialisation(e.to_string())
    }
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
