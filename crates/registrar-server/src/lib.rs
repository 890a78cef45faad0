//! Registrar server - HTTP API and configuration for the service registrar.
//!
//! Exposes the catalog over HTTP and wires together storage, the catalog
//! controller and the MQTT bridge.

pub mod api;
pub mod config;
pub mod error;

pub use config::{HttpConfig, RegistrarConfig};
pub use error::{Result, ServerError};
