//! rumqttc-backed broker transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    TlsConfiguration, Transport,
};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::BrokerSettings;
use crate::error::{BridgeError, Result};

use super::{BrokerClient, BrokerConnector, ConnectionEvent};

const REQUEST_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// Connects to MQTT brokers with rumqttc.
#[derive(Debug, Default, Clone, Copy)]
pub struct RumqttcConnector;

impl RumqttcConnector {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrokerConnector for RumqttcConnector {
    async fn connect(
        &self,
        settings: &BrokerSettings,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Arc<dyn BrokerClient>> {
        let options = options(settings).await?;
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        match tokio::time::timeout(settings.connect_timeout, wait_for_connack(&mut eventloop)).await
        {
            Err(_) => {
                return Err(BridgeError::Timeout {
                    uri: settings.uri.clone(),
                })
            }
            Ok(Err(e)) => return Err(BridgeError::connect(&settings.uri, e)),
            Ok(Ok(())) => {}
        }
        info!(uri = %settings.uri, "connected to broker");

        events
            .send(ConnectionEvent::Connected)
            .await
            .map_err(|_| BridgeError::NotConnected(settings.uri.clone()))?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll(
            settings.uri.clone(),
            eventloop,
            events,
            cancel.clone(),
        ));

        Ok(Arc::new(RumqttcClient {
            uri: settings.uri.clone(),
            client,
            cancel,
            task: Mutex::new(Some(task)),
        }))
    }
}

/// Open rumqttc connection.
pub struct RumqttcClient {
    uri: String,
    client: AsyncClient,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RumqttcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RumqttcClient")
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BrokerClient for RumqttcClient {
    async fn subscribe(&self, topic: &str, qos: u8) -> Result<()> {
        self.client.subscribe(topic, to_qos(qos)?).await?;
        Ok(())
    }

    async fn publish(&self, topic: &str, qos: u8, retain: bool, payload: Bytes) -> Result<()> {
        self.client
            .publish_bytes(topic, to_qos(qos)?, retain, payload)
            .await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Err(e) = self.client.disconnect().await {
            debug!(uri = %self.uri, error = %e, "disconnect request not sent");
        }

        if let Some(mut task) = self.task.lock().await.take() {
            // Give the event loop a moment to flush the DISCONNECT packet
            if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
                self.cancel.cancel();
                let _ = task.await;
            }
        }
        Ok(())
    }
}

fn to_qos(level: u8) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(BridgeError::config(format!("invalid qos {other}"))),
    }
}

async fn options(settings: &BrokerSettings) -> Result<MqttOptions> {
    let url = Url::parse(&settings.uri)
        .map_err(|e| BridgeError::config(format!("invalid broker uri {}: {e}", settings.uri)))?;
    let host = url
        .host_str()
        .ok_or_else(|| BridgeError::config(format!("broker uri {} has no host", settings.uri)))?;

    let (secure, default_port) = match url.scheme() {
        "tcp" | "mqtt" => (false, 1883),
        "ssl" | "tls" | "mqtts" => (true, 8883),
        other => {
            return Err(BridgeError::config(format!(
                "unsupported broker scheme: {other}"
            )))
        }
    };

    let mut options = MqttOptions::new(
        format!("SC-{}", Uuid::new_v4()),
        host,
        url.port().unwrap_or(default_port),
    );
    options.set_keep_alive(settings.keep_alive);
    options.set_clean_session(true);

    if let Some(username) = &settings.username {
        options.set_credentials(username, settings.password.clone().unwrap_or_default());
    }

    let tls_files =
        settings.ca_file.is_some() || settings.cert_file.is_some() || settings.key_file.is_some();
    if secure || tls_files {
        options.set_transport(tls_transport(settings).await?);
    }

    Ok(options)
}

async fn tls_transport(settings: &BrokerSettings) -> Result<Transport> {
    let Some(ca_file) = &settings.ca_file else {
        if settings.cert_file.is_some() || settings.key_file.is_some() {
            // A client certificate is only presented through a custom CA config
            return Err(BridgeError::Tls(
                "cert_file and key_file require ca_file".to_owned(),
            ));
        }
        return Ok(Transport::tls_with_default_config());
    };

    let ca = read_pem(ca_file).await?;
    let client_auth = match (&settings.cert_file, &settings.key_file) {
        (Some(cert), Some(key)) => Some((read_pem(cert).await?, read_pem(key).await?)),
        (None, None) => None,
        _ => {
            return Err(BridgeError::Tls(
                "cert_file and key_file must be set together".to_owned(),
            ))
        }
    };

    Ok(Transport::tls_with_config(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth,
    }))
}

async fn read_pem(path: &std::path::Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| BridgeError::Tls(format!("{}: {e}", path.display())))
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> std::result::Result<(), ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = eventloop.poll().await? {
            return Ok(());
        }
    }
}

async fn poll(
    uri: String,
    mut eventloop: EventLoop,
    events: mpsc::Sender<ConnectionEvent>,
    cancel: CancellationToken,
) {
    let mut connected = true;

    loop {
        let polled = tokio::select! {
            polled = eventloop.poll() => polled,
            () = cancel.cancelled() => break,
        };

        let event = match polled {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!(uri = %uri, "reconnected to broker");
                connected = true;
                ConnectionEvent::Connected
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => ConnectionEvent::Message {
                topic: String::from_utf8_lossy(publish.topic.as_ref()).into_owned(),
                payload: publish.payload,
            },
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => continue,
            Err(e) => {
                if connected {
                    connected = false;
                    warn!(uri = %uri, error = %e, "connection lost");
                    if events.send(ConnectionEvent::Lost(e.to_string())).await.is_err() {
                        break;
                    }
                } else {
                    debug!(uri = %uri, error = %e, "reconnect failed");
                }

                // rumqttc reconnects on the next poll
                tokio::select! {
                    () = tokio::time::sleep(RECONNECT_DELAY) => {}
                    () = cancel.cancelled() => break,
                }
                ConnectionEvent::Reconnecting
            }
        };

        if events.send(event).await.is_err() {
            break;
        }
    }

    debug!(uri = %uri, "event loop stopped");
}
