//! Bridge between the catalog and MQTT brokers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use registrar_catalog::{Controller, Listener, ListenerId, Service};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{BrokerSettings, MqttConfig};
use crate::error::Result;
use crate::manager::{ClientManager, ConnectionState, ManagerContext};
use crate::topic;
use crate::transport::BrokerConnector;

/// Mirrors catalog state onto MQTT brokers and feeds broker registrations
/// back into the catalog.
///
/// One [`ClientManager`] exists per broker URI. Brokers that cannot be
/// reached at startup are retried on `retry_interval` until they connect or
/// the bridge stops.
pub struct MqttBridge {
    controller: Arc<Controller>,
    connector: Arc<dyn BrokerConnector>,
    context: Arc<ManagerContext>,
    retry_interval: Duration,
    managers: DashMap<String, Arc<ClientManager>>,
    failed: Mutex<HashMap<String, BrokerSettings>>,
    listener: Mutex<Option<ListenerId>>,
    retry_task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    stopped: AtomicBool,
}

impl std::fmt::Debug for MqttBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBridge")
            .field("catalog_id", &self.context.catalog_id)
            .field("brokers", &self.managers.len())
            .finish_non_exhaustive()
    }
}

impl MqttBridge {
    /// Connects to every configured broker and starts mirroring.
    ///
    /// Brokers that fail to connect do not fail the bridge; they are retried
    /// in the background.
    pub async fn start(
        controller: Arc<Controller>,
        config: &MqttConfig,
        catalog_id: impl Into<String>,
        connector: Arc<dyn BrokerConnector>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let bridge = Arc::new(Self {
            context: Arc::new(ManagerContext {
                controller: Arc::clone(&controller),
                catalog_id: catalog_id.into(),
                topic_prefix: config.topic_prefix.clone(),
            }),
            controller,
            connector,
            retry_interval: config.retry_interval,
            managers: DashMap::new(),
            failed: Mutex::new(HashMap::new()),
            listener: Mutex::new(None),
            retry_task: Mutex::new(None),
            cancel: CancellationToken::new(),
            stopped: AtomicBool::new(false),
        });

        for settings in config.brokers() {
            if let Err(e) = bridge.register(&settings).await {
                warn!(
                    uri = %settings.uri,
                    error = %e,
                    retry_secs = bridge.retry_interval.as_secs(),
                    "error registering broker, will retry"
                );
                bridge.failed.lock().await.insert(settings.id.clone(), settings);
            }
        }

        let task = tokio::spawn(retry_loop(
            Arc::downgrade(&bridge),
            bridge.retry_interval,
            bridge.cancel.clone(),
        ));
        *bridge.retry_task.lock().await = Some(task);

        // Listener registration comes last so that the bridge is fully built
        let id = bridge
            .controller
            .add_listener(Arc::clone(&bridge) as Arc<dyn Listener>)
            .await;
        *bridge.listener.lock().await = Some(id);

        info!(brokers = bridge.managers.len(), "mqtt bridge started");
        Ok(bridge)
    }

    /// Connects a broker, or merges its topics into an existing connection
    /// to the same URI.
    pub async fn register(&self, settings: &BrokerSettings) -> Result<()> {
        let existing = self
            .managers
            .get(&settings.uri)
            .map(|entry| Arc::clone(entry.value()));
        if let Some(manager) = existing {
            return manager.add_topics(settings).await;
        }

        let manager = ClientManager::connect(
            settings,
            self.connector.as_ref(),
            Arc::clone(&self.context),
            self.cancel.child_token(),
        )
        .await?;
        self.managers.insert(settings.uri.clone(), manager);
        Ok(())
    }

    /// Retries every failed broker once. Returns how many connected.
    pub async fn retry_failed(&self) -> usize {
        // The failed set is not locked while connecting
        let pending: Vec<BrokerSettings> = self.failed.lock().await.values().cloned().collect();
        let mut recovered = 0;

        for settings in pending {
            match self.register(&settings).await {
                Ok(()) => {
                    self.failed.lock().await.remove(&settings.id);
                    info!(uri = %settings.uri, "broker registered after retry");
                    recovered += 1;
                }
                Err(e) => warn!(
                    uri = %settings.uri,
                    error = %e,
                    retry_secs = self.retry_interval.as_secs(),
                    "error registering broker, will retry"
                ),
            }
        }
        recovered
    }

    /// IDs of brokers waiting to be retried, sorted.
    pub async fn failed_brokers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.failed.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Connection state of the broker at `uri`, if it has a manager.
    pub fn connection_state(&self, uri: &str) -> Option<ConnectionState> {
        self.managers.get(uri).map(|m| m.state())
    }

    /// Number of configuration entries subscribed to `topic` on `uri`.
    pub async fn subscription_receivers(&self, uri: &str, topic: &str) -> Option<usize> {
        let manager = self.managers.get(uri).map(|m| Arc::clone(m.value()))?;
        manager.receivers(topic).await
    }

    /// Stops retries, disconnects every broker and detaches from the catalog.
    ///
    /// Calling `stop` again has no effect.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(id) = self.listener.lock().await.take() {
            self.controller.remove_listener(id).await;
        }

        self.cancel.cancel();
        if let Some(task) = self.retry_task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "broker retry task terminated abnormally");
            }
        }

        let managers: Vec<Arc<ClientManager>> = self
            .managers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.managers.clear();
        for manager in managers {
            manager.shutdown().await;
        }

        self.failed.lock().await.clear();
        info!("mqtt bridge stopped");
    }

    async fn publish_all(&self, topic: &str, retain: bool, payload: Bytes) {
        let managers: Vec<Arc<ClientManager>> = self
            .managers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for manager in managers {
            if manager.state() != ConnectionState::Connected {
                debug!(uri = %manager.uri(), topic, "broker not connected, skipping publish");
                continue;
            }
            if let Err(e) = manager.publish(topic, retain, payload.clone()).await {
                warn!(uri = %manager.uri(), topic, error = %e, "error publishing");
            }
        }
    }

    async fn publish_alive(&self, service: &Service) {
        let payload = match serde_json::to_vec(service) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                warn!(id = %service.id, error = %e, "error serialising service");
                return;
            }
        };
        let topic = topic::alive_topic(&self.context.topic_prefix, service);
        self.publish_all(&topic, true, payload).await;
    }
}

#[async_trait]
impl Listener for MqttBridge {
    async fn added(&self, service: Service) {
        self.publish_alive(&service).await;
    }

    async fn updated(&self, service: Service) {
        self.publish_alive(&service).await;
    }

    async fn deleted(&self, service: Service) {
        let prefix = &self.context.topic_prefix;

        // An empty retained payload clears the alive announcement
        self.publish_all(&topic::alive_topic(prefix, &service), true, Bytes::new())
            .await;

        match serde_json::to_vec(&service) {
            Ok(payload) => {
                self.publish_all(&topic::dead_topic(prefix, &service), false, Bytes::from(payload))
                    .await;
            }
            Err(e) => warn!(id = %service.id, error = %e, "error serialising service"),
        }
    }
}

async fn retry_loop(bridge: Weak<MqttBridge>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(bridge) = bridge.upgrade() else {
                    break;
                };
                if bridge.failed.lock().await.is_empty() {
                    continue;
                }
                bridge.retry_failed().await;
            }
            () = cancel.cancelled() => {
                break;
            }
        }
    }

    debug!("broker retry loop stopped");
}
