//! Configuration for the registrar server.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use registrar_catalog::{CatalogSettings, StorageConfig};
use registrar_mqtt::MqttConfig;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{Result, ServerError};

/// Top-level configuration for the registrar.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistrarConfig {
    /// Catalog identifier. Generated at startup when blank.
    pub id: String,

    /// Human-readable catalog description.
    pub description: String,

    /// HTTP server configuration.
    pub http: HttpConfig,

    /// Storage backend configuration.
    pub storage: StorageConfig,

    /// Lease and notification settings.
    pub catalog: CatalogSettings,

    /// MQTT bridge configuration.
    pub mqtt: MqttConfig,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            description: "Service Registrar".to_owned(),
            http: HttpConfig::default(),
            storage: StorageConfig::default(),
            catalog: CatalogSettings::default(),
            mqtt: MqttConfig::default(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8082),
        }
    }
}

impl RegistrarConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `registrar.toml` in the current directory (if present)
    /// 3. Environment variables with `REGISTRAR_` prefix, `__` between levels
    pub fn load() -> Result<Self> {
        Self::from_file("registrar.toml")
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed("REGISTRAR_").split("__")),
        )
    }

    /// Extract configuration from an assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        figment
            .extract()
            .map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Assigns a generated catalog ID when none is configured.
    pub fn ensure_id(&mut self) {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.storage
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        self.catalog
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        self.mqtt
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        Ok(())
    }
}
