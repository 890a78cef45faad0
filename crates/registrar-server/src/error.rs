//! Error types for the registrar server.

use thiserror::Error;

/// Server startup and configuration errors.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Catalog(#[from] registrar_catalog::CatalogError),

    #[error(transparent)]
    Bridge(#[from] registrar_mqtt::BridgeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
