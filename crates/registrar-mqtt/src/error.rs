//! Error types for the MQTT bridge.

use thiserror::Error;

/// Bridge errors.
///
/// These never reach catalog callers; they are logged and drive the broker
/// retry loop.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Invalid bridge configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Broker could not be reached.
    #[error("error connecting to broker {uri}: {reason}")]
    Connect { uri: String, reason: String },

    /// Broker did not acknowledge the connection in time.
    #[error("timed out connecting to broker {uri}")]
    Timeout { uri: String },

    /// The client request queue is closed or full.
    #[error("client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// TLS material could not be loaded.
    #[error("tls error: {0}")]
    Tls(String),

    /// The connection is down.
    #[error("not connected to {0}")]
    NotConnected(String),
}

impl BridgeError {
    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error.
    #[must_use]
    pub fn connect(uri: &str, reason: impl std::fmt::Display) -> Self {
        Self::Connect {
            uri: uri.to_owned(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
