//! In-process broker for tests and embedding.
//!
//! One [`MemoryBroker`] stands in for any number of broker URIs. Sessions,
//! subscriptions and retained messages are kept per URI. Connection failures
//! and drops can be scripted to exercise reconnection handling.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::config::BrokerSettings;
use crate::error::{BridgeError, Result};
use crate::topic;

use super::{BrokerClient, BrokerConnector, ConnectionEvent};

/// A message published by a connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
}

struct Session {
    uri: String,
    events: mpsc::Sender<ConnectionEvent>,
    subscriptions: Vec<String>,
    connected: bool,
}

#[derive(Default)]
struct BrokerState {
    next_session: u64,
    sessions: HashMap<u64, Session>,
    retained: HashMap<String, BTreeMap<String, Bytes>>,
    failures: HashMap<String, usize>,
    publications: HashMap<String, Vec<Publication>>,
    subscribe_log: HashMap<String, Vec<String>>,
    connects: HashMap<String, usize>,
}

/// In-process MQTT broker.
#[derive(Default)]
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker").finish_non_exhaustive()
    }
}

impl MemoryBroker {
    /// Creates an empty broker.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a connector that opens sessions on this broker.
    pub fn connector(self: &Arc<Self>) -> MemoryConnector {
        MemoryConnector {
            broker: Arc::clone(self),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `attempts` connections to `uri` fail.
    pub fn fail_connects(&self, uri: &str, attempts: usize) {
        self.lock().failures.insert(uri.to_owned(), attempts);
    }

    /// Publishes a message as an external client of `uri`.
    pub fn publish(&self, uri: &str, topic: &str, payload: impl Into<Bytes>, retain: bool) {
        let payload = payload.into();
        let mut state = self.lock();
        route(&mut state, uri, topic, &payload, retain);
    }

    /// Drops every session connected to `uri`.
    ///
    /// Sessions lose their subscriptions, as with a clean-session client.
    pub fn drop_connections(&self, uri: &str, reason: &str) {
        let mut state = self.lock();
        for session in state.sessions.values_mut().filter(|s| s.uri == uri) {
            session.connected = false;
            session.subscriptions.clear();
            deliver(session, ConnectionEvent::Lost(reason.to_owned()));
        }
    }

    /// Reconnects every dropped session of `uri`.
    pub fn restore_connections(&self, uri: &str) {
        let mut state = self.lock();
        for session in state
            .sessions
            .values_mut()
            .filter(|s| s.uri == uri && !s.connected)
        {
            session.connected = true;
            deliver(session, ConnectionEvent::Reconnecting);
            deliver(session, ConnectionEvent::Connected);
        }
    }

    /// Returns every message clients published to `uri`, oldest first.
    pub fn publications(&self, uri: &str) -> Vec<Publication> {
        self.lock().publications.get(uri).cloned().unwrap_or_default()
    }

    /// Returns the retained message for `topic` on `uri`.
    pub fn retained(&self, uri: &str, topic: &str) -> Option<Bytes> {
        self.lock()
            .retained
            .get(uri)
            .and_then(|topics| topics.get(topic))
            .cloned()
    }

    /// Returns how many SUBSCRIBE requests named `topic` on `uri`.
    pub fn subscribe_count(&self, uri: &str, topic: &str) -> usize {
        self.lock()
            .subscribe_log
            .get(uri)
            .map_or(0, |log| log.iter().filter(|t| *t == topic).count())
    }

    /// Returns the number of successful connections to `uri`.
    pub fn connect_count(&self, uri: &str) -> usize {
        self.lock().connects.get(uri).copied().unwrap_or(0)
    }

    /// Returns the number of live sessions on `uri`.
    pub fn session_count(&self, uri: &str) -> usize {
        self.lock()
            .sessions
            .values()
            .filter(|s| s.uri == uri && s.connected)
            .count()
    }
}

fn deliver(session: &Session, event: ConnectionEvent) {
    match session.events.try_send(event) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(_)) => {
            warn!(uri = %session.uri, "memory broker session queue full, dropping event");
        }
    }
}

fn route(state: &mut BrokerState, uri: &str, topic: &str, payload: &Bytes, retain: bool) {
    if retain {
        let retained = state.retained.entry(uri.to_owned()).or_default();
        if payload.is_empty() {
            retained.remove(topic);
        } else {
            retained.insert(topic.to_owned(), payload.clone());
        }
    }

    for session in state
        .sessions
        .values()
        .filter(|s| s.uri == uri && s.connected)
    {
        if session.subscriptions.iter().any(|f| topic::matches(f, topic)) {
            deliver(
                session,
                ConnectionEvent::Message {
                    topic: topic.to_owned(),
                    payload: payload.clone(),
                },
            );
        }
    }
}

/// Opens sessions on a [`MemoryBroker`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    broker: Arc<MemoryBroker>,
}

#[async_trait]
impl BrokerConnector for MemoryConnector {
    async fn connect(
        &self,
        settings: &BrokerSettings,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Arc<dyn BrokerClient>> {
        let mut state = self.broker.lock();

        if let Some(remaining) = state.failures.get_mut(&settings.uri) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BridgeError::connect(&settings.uri, "connection refused"));
            }
        }

        let id = state.next_session;
        state.next_session += 1;
        *state.connects.entry(settings.uri.clone()).or_default() += 1;

        let session = Session {
            uri: settings.uri.clone(),
            events,
            subscriptions: Vec::new(),
            connected: true,
        };
        deliver(&session, ConnectionEvent::Connected);
        state.sessions.insert(id, session);

        Ok(Arc::new(MemoryClient {
            broker: Arc::clone(&self.broker),
            session: id,
            uri: settings.uri.clone(),
        }))
    }
}

/// Session on a [`MemoryBroker`].
#[derive(Debug)]
struct MemoryClient {
    broker: Arc<MemoryBroker>,
    session: u64,
    uri: String,
}

impl MemoryClient {
    fn ensure_connected(&self, state: &BrokerState) -> Result<()> {
        match state.sessions.get(&self.session) {
            Some(session) if session.connected => Ok(()),
            _ => Err(BridgeError::NotConnected(self.uri.clone())),
        }
    }
}

#[async_trait]
impl BrokerClient for MemoryClient {
    async fn subscribe(&self, topic: &str, _qos: u8) -> Result<()> {
        let mut state = self.broker.lock();
        self.ensure_connected(&state)?;

        state
            .subscribe_log
            .entry(self.uri.clone())
            .or_default()
            .push(topic.to_owned());

        let retained: Vec<(String, Bytes)> = state
            .retained
            .get(&self.uri)
            .map(|topics| {
                topics
                    .iter()
                    .filter(|(t, _)| topic::matches(topic, t))
                    .map(|(t, p)| (t.clone(), p.clone()))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(session) = state.sessions.get_mut(&self.session) {
            if !session.subscriptions.iter().any(|t| t == topic) {
                session.subscriptions.push(topic.to_owned());
            }
            for (topic, payload) in retained {
                deliver(session, ConnectionEvent::Message { topic, payload });
            }
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, _qos: u8, retain: bool, payload: Bytes) -> Result<()> {
        let mut state = self.broker.lock();
        self.ensure_connected(&state)?;

        state
            .publications
            .entry(self.uri.clone())
            .or_default()
            .push(Publication {
                topic: topic.to_owned(),
                payload: payload.clone(),
                retain,
            });
        route(&mut state, &self.uri, topic, &payload, retain);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.broker.lock().sessions.remove(&self.session);
        Ok(())
    }
}
