//! Registrar MQTT bridge - mirrors the service catalog onto MQTT brokers.
//!
//! The bridge works in both directions:
//!
//! - **Inbound**: messages on registration topics create or renew services;
//!   messages on will topics remove them
//! - **Outbound**: catalog changes are published as retained `alive`
//!   announcements, and removals as `dead` announcements
//!
//! Each broker gets a [`ClientManager`] that tracks connection state,
//! resubscribes after reconnection and keeps a catalog entry describing the
//! broker itself. Brokers that cannot be reached are retried in the
//! background.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use registrar_mqtt::{MqttBridge, MqttConfig, RumqttcConnector};
//!
//! let bridge = MqttBridge::start(controller, &config, "registrar-1", Arc::new(RumqttcConnector::new())).await?;
//! // ...
//! bridge.stop().await;
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod inbound;
pub mod manager;
pub mod topic;
pub mod transport;

pub use bridge::MqttBridge;
pub use config::{BrokerConfig, BrokerSettings, MqttConfig, TopicSettings};
pub use error::{BridgeError, Result};
pub use inbound::{Inbound, Rejected};
pub use manager::{ClientManager, ConnectionState, BROKER_SERVICE_TYPE};
pub use transport::{
    BrokerClient, BrokerConnector, ConnectionEvent, MemoryBroker, MemoryConnector, Publication,
    RumqttcConnector,
};
