//! Configuration types for the MQTT bridge.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use registrar_catalog::config::serde_duration_secs;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{BridgeError, Result};

/// MQTT bridge configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Primary broker.
    pub client: Option<BrokerConfig>,
    /// Further brokers served by the same bridge.
    pub additional_clients: Vec<BrokerConfig>,
    /// Registration topics subscribed on every broker.
    pub common_reg_topics: Vec<String>,
    /// Will topics subscribed on every broker.
    pub common_will_topics: Vec<String>,
    /// Prefix for outbound alive/dead announcements.
    pub topic_prefix: String,
    /// Interval between reconnection attempts for failed brokers.
    #[serde(with = "serde_duration_secs")]
    pub retry_interval: Duration,
    /// Time allowed for a broker to acknowledge a connection.
    #[serde(with = "serde_duration_secs")]
    pub connect_timeout: Duration,
    /// MQTT keep-alive interval.
    #[serde(with = "serde_duration_secs")]
    pub keep_alive: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            client: None,
            additional_clients: Vec::new(),
            common_reg_topics: Vec::new(),
            common_will_topics: Vec::new(),
            topic_prefix: "sc".to_owned(),
            retry_interval: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            keep_alive: Duration::from_secs(30),
        }
    }
}

/// Connection settings for one broker as written in configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Catalog ID of the broker's self-announcement. Generated when blank.
    pub broker_id: String,
    /// Broker URI, e.g. `tcp://localhost:1883`. Blank entries are ignored.
    pub broker_uri: String,
    /// Registration topics for this broker only.
    pub reg_topics: Vec<String>,
    /// Will topics for this broker only.
    pub will_topics: Vec<String>,
    /// Subscription and publication QoS.
    pub qos: u8,
    /// Username for broker authentication.
    pub username: Option<String>,
    /// Password for broker authentication.
    pub password: Option<String>,
    /// PEM CA bundle. Enables TLS on any scheme.
    pub ca_file: Option<PathBuf>,
    /// PEM client certificate. Requires `key_file` and `ca_file`.
    pub cert_file: Option<PathBuf>,
    /// PEM client private key. Requires `cert_file` and `ca_file`.
    pub key_file: Option<PathBuf>,
}

/// A subscription requested on a broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSettings {
    /// Topic filter.
    pub topic: String,
    /// Messages on this topic deregister services.
    pub will: bool,
}

/// Resolved settings for connecting to one broker.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Catalog ID of the broker's self-announcement.
    pub id: String,
    /// Broker URI.
    pub uri: String,
    /// Subscriptions to make on every connection.
    pub topics: Vec<TopicSettings>,
    /// Subscription and publication QoS.
    pub qos: u8,
    /// Username for broker authentication.
    pub username: Option<String>,
    /// Password for broker authentication.
    pub password: Option<String>,
    /// PEM CA bundle.
    pub ca_file: Option<PathBuf>,
    /// PEM client certificate.
    pub cert_file: Option<PathBuf>,
    /// PEM client private key.
    pub key_file: Option<PathBuf>,
    /// MQTT keep-alive interval.
    pub keep_alive: Duration,
    /// Time allowed for the connection to be acknowledged.
    pub connect_timeout: Duration,
}

impl BrokerSettings {
    /// Creates settings for a broker with default timeouts and no topics.
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        let defaults = MqttConfig::default();
        Self {
            id: id.into(),
            uri: uri.into(),
            topics: Vec::new(),
            qos: 1,
            username: None,
            password: None,
            ca_file: None,
            cert_file: None,
            key_file: None,
            keep_alive: defaults.keep_alive,
            connect_timeout: defaults.connect_timeout,
        }
    }

    /// Adds a registration topic.
    #[must_use]
    pub fn with_reg_topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.push(TopicSettings {
            topic: topic.into(),
            will: false,
        });
        self
    }

    /// Adds a will topic.
    #[must_use]
    pub fn with_will_topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.push(TopicSettings {
            topic: topic.into(),
            will: true,
        });
        self
    }
}

impl MqttConfig {
    /// Returns true if at least one broker is configured.
    pub fn is_enabled(&self) -> bool {
        self.configured().next().is_some()
    }

    fn configured(&self) -> impl Iterator<Item = &BrokerConfig> {
        self.client
            .iter()
            .chain(self.additional_clients.iter())
            .filter(|b| !b.broker_uri.is_empty())
    }

    /// Validates the bridge configuration.
    pub fn validate(&self) -> Result<()> {
        if self.retry_interval.is_zero() {
            return Err(BridgeError::config("mqtt: retry_interval must be positive"));
        }
        if self.connect_timeout.is_zero() {
            return Err(BridgeError::config("mqtt: connect_timeout must be positive"));
        }
        if !self.keep_alive.is_zero() && self.keep_alive < Duration::from_secs(1) {
            return Err(BridgeError::config(
                "mqtt: keep_alive must be zero or at least one second",
            ));
        }
        if self.topic_prefix.is_empty() || self.topic_prefix.contains(['+', '#']) {
            return Err(BridgeError::config(
                "mqtt: topic_prefix must be non-empty and free of wildcards",
            ));
        }

        for broker in self.configured() {
            let url = url::Url::parse(&broker.broker_uri).map_err(|e| {
                BridgeError::config(format!("mqtt: invalid broker_uri {}: {e}", broker.broker_uri))
            })?;
            if matches!(url.host_str(), None | Some("")) {
                return Err(BridgeError::config(format!(
                    "mqtt: broker_uri {} has no host",
                    broker.broker_uri
                )));
            }
            if broker.qos > 2 {
                return Err(BridgeError::config("mqtt: qos must be 0, 1, or 2"));
            }
            if broker.cert_file.is_some() != broker.key_file.is_some() {
                return Err(BridgeError::config(
                    "mqtt: cert_file and key_file must be set together",
                ));
            }
            if broker.cert_file.is_some() && broker.ca_file.is_none() {
                return Err(BridgeError::config("mqtt: cert_file requires ca_file"));
            }
            if self.common_reg_topics.is_empty() && broker.reg_topics.is_empty() {
                return Err(BridgeError::config(format!(
                    "mqtt: reg_topics not defined for {}",
                    broker.broker_uri
                )));
            }
        }
        Ok(())
    }

    /// Resolves every configured broker into connection settings.
    ///
    /// Common topics come first, followed by the broker's own. A topic listed
    /// more than once is subscribed once, as a will topic if any listing was.
    pub fn brokers(&self) -> Vec<BrokerSettings> {
        self.configured()
            .map(|broker| {
                let will: HashSet<&str> = self
                    .common_will_topics
                    .iter()
                    .chain(&broker.will_topics)
                    .map(String::as_str)
                    .collect();

                let mut seen = HashSet::new();
                let topics = [
                    &self.common_reg_topics,
                    &self.common_will_topics,
                    &broker.reg_topics,
                    &broker.will_topics,
                ]
                .into_iter()
                .flatten()
                .filter(|topic| seen.insert(topic.as_str()))
                .map(|topic| TopicSettings {
                    topic: topic.clone(),
                    will: will.contains(topic.as_str()),
                })
                .collect();

                let id = if broker.broker_id.is_empty() {
                    Uuid::new_v4().to_string()
                } else {
                    broker.broker_id.clone()
                };

                BrokerSettings {
                    id,
                    uri: broker.broker_uri.clone(),
                    topics,
                    qos: broker.qos,
                    username: broker.username.clone(),
                    password: broker.password.clone(),
                    ca_file: broker.ca_file.clone(),
                    cert_file: broker.cert_file.clone(),
                    key_file: broker.key_file.clone(),
                    keep_alive: self.keep_alive,
                    connect_timeout: self.connect_timeout,
                }
            })
            .collect()
    }
}
