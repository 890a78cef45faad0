//! Per-broker connection management.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use registrar_catalog::{Api, Controller, Service};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BrokerSettings;
use crate::error::{BridgeError, Result};
use crate::inbound::{self, Inbound};
use crate::topic;
use crate::transport::{BrokerClient, BrokerConnector, ConnectionEvent};

/// Service type of a broker's self-announcement.
pub const BROKER_SERVICE_TYPE: &str = "_mqtt._tcp";

const EVENT_CAPACITY: usize = 256;

/// Connection state of a broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started, or stopped.
    Disconnected,
    /// Waiting for the broker to acknowledge the connection.
    Connecting,
    /// Acknowledged; subscriptions are active.
    Connected,
    /// The connection dropped and the client is reconnecting.
    Lost,
}

#[derive(Debug, Clone)]
struct Subscription {
    qos: u8,
    receivers: usize,
    will: bool,
}

/// Shared by every manager of a bridge.
#[derive(Debug)]
pub(crate) struct ManagerContext {
    pub(crate) controller: Arc<Controller>,
    pub(crate) catalog_id: String,
    pub(crate) topic_prefix: String,
}

/// One broker connection and its subscriptions.
pub struct ClientManager {
    uri: String,
    broker_id: String,
    qos: u8,
    client: Arc<dyn BrokerClient>,
    state: Mutex<ConnectionState>,
    subscriptions: tokio::sync::Mutex<BTreeMap<String, Subscription>>,
    context: Arc<ManagerContext>,
    cancel: CancellationToken,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientManager")
            .field("uri", &self.uri)
            .field("broker_id", &self.broker_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ClientManager {
    /// Connects to a broker and starts handling its events.
    ///
    /// Subscriptions are made once the connection is acknowledged, and again
    /// after every reconnection.
    pub(crate) async fn connect(
        settings: &BrokerSettings,
        connector: &dyn BrokerConnector,
        context: Arc<ManagerContext>,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>> {
        let subscriptions = settings
            .topics
            .iter()
            .map(|t| {
                (
                    t.topic.clone(),
                    Subscription {
                        qos: settings.qos,
                        receivers: 1,
                        will: t.will,
                    },
                )
            })
            .collect();

        let (sender, receiver) = mpsc::channel(EVENT_CAPACITY);
        debug!(uri = %settings.uri, "connecting to broker");
        let client = connector.connect(settings, sender).await?;

        let manager = Arc::new(Self {
            uri: settings.uri.clone(),
            broker_id: settings.id.clone(),
            qos: settings.qos,
            client,
            state: Mutex::new(ConnectionState::Connecting),
            subscriptions: tokio::sync::Mutex::new(subscriptions),
            context,
            cancel,
            task: tokio::sync::Mutex::new(None),
        });

        let task = tokio::spawn(Arc::clone(&manager).run(receiver));
        *manager.task.lock().await = Some(task);
        Ok(manager)
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Returns how many configuration entries requested `topic`.
    pub async fn receivers(&self, topic: &str) -> Option<usize> {
        self.subscriptions.lock().await.get(topic).map(|s| s.receivers)
    }

    /// Adds the topics of another configuration entry for the same broker.
    ///
    /// Known topics gain a receiver; new topics are subscribed immediately.
    pub(crate) async fn add_topics(&self, settings: &BrokerSettings) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().await;

        for requested in &settings.topics {
            if let Some(existing) = subscriptions.get_mut(&requested.topic) {
                existing.receivers += 1;
                debug!(uri = %self.uri, topic = %requested.topic, "already subscribed");
                continue;
            }

            let subscription = Subscription {
                qos: settings.qos,
                receivers: 1,
                will: requested.will,
            };
            if self.state() == ConnectionState::Connected {
                self.client
                    .subscribe(&requested.topic, subscription.qos)
                    .await?;
                info!(uri = %self.uri, topic = %requested.topic, will = requested.will, "subscribed");
            }
            subscriptions.insert(requested.topic.clone(), subscription);
        }
        Ok(())
    }

    /// Publishes on this broker with its configured QoS.
    pub async fn publish(&self, topic: &str, retain: bool, payload: Bytes) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(BridgeError::NotConnected(self.uri.clone()));
        }
        self.client.publish(topic, self.qos, retain, payload).await
    }

    /// Stops event handling and closes the connection.
    pub(crate) async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(uri = %self.uri, error = %e, "broker event task terminated abnormally");
            }
        }
        if let Err(e) = self.client.disconnect().await {
            warn!(uri = %self.uri, error = %e, "error disconnecting from broker");
        }
        self.set_state(ConnectionState::Disconnected);
        info!(uri = %self.uri, "disconnected from broker");
    }

    async fn run(self: Arc<Self>, mut receiver: mpsc::Receiver<ConnectionEvent>) {
        loop {
            let event = tokio::select! {
                event = receiver.recv() => event,
                () = self.cancel.cancelled() => break,
            };
            let Some(event) = event else {
                break;
            };

            match event {
                ConnectionEvent::Connected => self.on_connected().await,
                ConnectionEvent::Lost(reason) => {
                    warn!(uri = %self.uri, reason = %reason, "connection lost");
                    self.set_state(ConnectionState::Lost);
                    self.announce(false).await;
                }
                ConnectionEvent::Reconnecting => self.set_state(ConnectionState::Connecting),
                ConnectionEvent::Message { topic, payload } => {
                    self.on_message(&topic, &payload).await;
                }
            }
        }
        debug!(uri = %self.uri, "broker event task stopped");
    }

    async fn on_connected(&self) {
        info!(uri = %self.uri, "connected");

        // State changes under the table lock so add_topics never subscribes
        // a topic that is also in this snapshot
        let subscriptions: Vec<(String, Subscription)> = {
            let table = self.subscriptions.lock().await;
            self.set_state(ConnectionState::Connected);
            table.iter().map(|(t, s)| (t.clone(), s.clone())).collect()
        };

        for (topic, subscription) in subscriptions {
            match self.client.subscribe(&topic, subscription.qos).await {
                Ok(()) => {
                    info!(uri = %self.uri, topic = %topic, will = subscription.will, "subscribed");
                }
                Err(e) => warn!(uri = %self.uri, topic = %topic, error = %e, "error subscribing"),
            }
        }

        self.announce(true).await;
    }

    async fn on_message(&self, topic: &str, payload: &[u8]) {
        debug!(uri = %self.uri, topic, bytes = payload.len(), "message received");

        if topic::is_announcement(&self.context.topic_prefix, topic) {
            return;
        }

        let will = self
            .subscriptions
            .lock()
            .await
            .iter()
            .any(|(filter, s)| s.will && topic::matches(filter, topic));

        match inbound::parse(topic, payload, will) {
            Ok(parsed) => inbound::apply(&self.context.controller, parsed).await,
            Err(rejected) => warn!(uri = %self.uri, topic, reason = %rejected, "ignoring message"),
        }
    }

    /// Registers or refreshes this broker's own catalog entry.
    async fn announce(&self, connected: bool) {
        let service = Service::new(BROKER_SERVICE_TYPE)
            .with_id(self.broker_id.clone())
            .with_description("MQTT Broker")
            .with_api(Api::new("MQTT", self.uri.clone()))
            .with_meta("registrator", self.context.catalog_id.clone())
            .with_meta("connected", connected);

        inbound::apply(&self.context.controller, Inbound::Register(service)).await;
    }
}
