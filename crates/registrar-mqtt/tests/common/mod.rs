//! Common test utilities for bridge integration tests.

#![allow(dead_code)]

pub mod fixtures;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use registrar_catalog::{CatalogSettings, Controller, MemoryStorage};
use registrar_mqtt::{MemoryBroker, MqttBridge, MqttConfig};

pub const URI: &str = "tcp://broker.test:1883";
pub const BROKER_ID: &str = "test-broker";
pub const CATALOG_ID: &str = "registrar-test";

/// Catalog, in-process broker and bridge wired together.
pub struct TestBridge {
    pub controller: Arc<Controller>,
    pub broker: Arc<MemoryBroker>,
    pub bridge: Arc<MqttBridge>,
}

impl TestBridge {
    /// Starts a bridge for the given configuration.
    pub async fn start(config: MqttConfig) -> Self {
        Self::start_with_broker(config, MemoryBroker::new()).await
    }

    /// Starts a bridge on a pre-scripted broker.
    pub async fn start_with_broker(config: MqttConfig, broker: Arc<MemoryBroker>) -> Self {
        let controller =
            Controller::new(Arc::new(MemoryStorage::new()), CatalogSettings::default())
                .await
                .unwrap();
        let bridge = MqttBridge::start(
            Arc::clone(&controller),
            &config,
            CATALOG_ID,
            Arc::new(broker.connector()),
        )
        .await
        .unwrap();

        Self {
            controller,
            broker,
            bridge,
        }
    }

    /// Waits until the broker's self-announcement reports `connected`.
    pub async fn wait_for_announcement(&self, connected: bool) {
        let controller = &self.controller;
        let announced = eventually(|| async move {
            controller
                .get(BROKER_ID)
                .await
                .is_ok_and(|s| s.meta.get("connected") == Some(&serde_json::Value::Bool(connected)))
        })
        .await;
        assert!(announced, "broker announcement connected={connected} not seen");
    }

    pub async fn shutdown(self) {
        self.bridge.stop().await;
        self.controller.stop().await.unwrap();
    }
}

/// Polls `check` every 10ms for up to two seconds.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
