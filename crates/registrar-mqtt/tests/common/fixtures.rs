//! Test fixtures for bridge integration tests.

use std::time::Duration;

use registrar_mqtt::{BrokerConfig, MqttConfig};

use super::{BROKER_ID, URI};

/// Builder for creating test MqttConfig instances.
pub struct ConfigBuilder {
    config: MqttConfig,
}

impl ConfigBuilder {
    /// One broker with registration topic `sc/service/+` and will topic
    /// `sc/will/+`.
    pub fn new() -> Self {
        Self {
            config: MqttConfig {
                client: Some(BrokerConfig {
                    broker_id: BROKER_ID.to_string(),
                    broker_uri: URI.to_string(),
                    qos: 1,
                    ..BrokerConfig::default()
                }),
                common_reg_topics: vec!["sc/service/+".to_string()],
                common_will_topics: vec!["sc/will/+".to_string()],
                retry_interval: Duration::from_millis(50),
                ..MqttConfig::default()
            },
        }
    }

    /// Replaces the common registration topics.
    pub fn with_reg_topics(mut self, topics: Vec<&str>) -> Self {
        self.config.common_reg_topics = topics.into_iter().map(String::from).collect();
        self
    }

    /// Adds another configuration entry.
    pub fn with_additional(mut self, broker: BrokerConfig) -> Self {
        self.config.additional_clients.push(broker);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> MqttConfig {
        self.config
    }
}
