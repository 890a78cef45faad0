//! Broker transport abstractions.
//!
//! A [`BrokerConnector`] opens a connection described by [`BrokerSettings`]
//! and reports its lifecycle through a channel of [`ConnectionEvent`]s. The
//! production connector is built on rumqttc; an in-process broker backs the
//! tests.

mod client;
mod memory;

pub use client::{RumqttcClient, RumqttcConnector};
pub use memory::{MemoryBroker, MemoryConnector, Publication};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::BrokerSettings;
use crate::error::Result;

/// Connection lifecycle and traffic reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The broker acknowledged the connection. Sent for the initial
    /// connection and for every reconnection.
    Connected,
    /// The connection dropped.
    Lost(String),
    /// The transport is attempting to reconnect.
    Reconnecting,
    /// A message arrived on a subscribed topic.
    Message { topic: String, payload: Bytes },
}

/// An open broker connection.
#[async_trait]
pub trait BrokerClient: Send + Sync + std::fmt::Debug {
    /// Subscribes to a topic filter.
    async fn subscribe(&self, topic: &str, qos: u8) -> Result<()>;

    /// Publishes a message.
    async fn publish(&self, topic: &str, qos: u8, retain: bool, payload: Bytes) -> Result<()>;

    /// Closes the connection. No further events are reported.
    async fn disconnect(&self) -> Result<()>;
}

/// Opens broker connections.
#[async_trait]
pub trait BrokerConnector: Send + Sync + std::fmt::Debug {
    /// Connects to the broker, waiting at most `settings.connect_timeout`
    /// for the acknowledgement.
    ///
    /// On success [`ConnectionEvent::Connected`] has already been queued on
    /// `events`.
    async fn connect(
        &self,
        settings: &BrokerSettings,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Arc<dyn BrokerClient>>;
}
