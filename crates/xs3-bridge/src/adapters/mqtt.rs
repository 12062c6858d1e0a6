//! MQTT adapter over rumqttc.
//!
//! MQTT 3.1.1, QoS 1, clean session. The event loop reconnects on its own
//! after a fixed delay; subscriptions are NOT restored by the broker, the
//! bridge re-issues them on every [`TransportEvent::Connected`].

use crate::domain::config::MqttConfig;
use crate::ports::transport::{InboundMessage, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, TlsConfiguration,
    Transport as WireTransport,
};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Request queue depth between the client handle and the event loop
const REQUEST_CAPACITY: usize = 64;

/// Publish/subscribe half of the connection
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
}

/// Event-loop half of the connection; drive it with [`MqttConnection::run`]
pub struct MqttConnection {
    event_loop: EventLoop,
    reconnect_period: Duration,
}

/// Build the client and its event loop. Nothing touches the network until
/// the connection is run.
pub fn connect(config: &MqttConfig) -> Result<(MqttTransport, MqttConnection), TransportError> {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(config.keep_alive);
    options.set_clean_session(true);

    match config.tls_paths() {
        Some((ca, cert, key)) => {
            let tls = TlsConfiguration::Simple {
                ca: read_pem(ca)?,
                alpn: None,
                client_auth: Some((read_pem(cert)?, read_pem(key)?)),
            };
            options.set_transport(WireTransport::tls_with_config(tls));
        }
        None => warn!(host = %config.host, "TLS material not configured, connecting in plain text"),
    }

    let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
    info!(host = %config.host, port = config.port, client_id = %config.client_id, "MQTT client created");

    Ok((
        MqttTransport { client },
        MqttConnection {
            event_loop,
            reconnect_period: config.reconnect_period,
        },
    ))
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TransportError> {
    std::fs::read(path).map_err(|e| TransportError::Tls(format!("{}: {e}", path.display())))
}

impl MqttTransport {
    /// Ask the event loop to send DISCONNECT and stop
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        self.client
            .disconnect()
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn subscribe(&self, pattern: &str) -> Result<(), TransportError> {
        self.client
            .subscribe(pattern, QoS::AtLeastOnce)
            .await
            .map_err(|e| TransportError::Subscribe {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        self.client
            .publish_bytes(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

impl MqttConnection {
    /// Poll the event loop until a local disconnect or until `events` is
    /// dropped. Connection errors are logged and retried after the fixed
    /// reconnect period.
    pub async fn run(mut self, events: mpsc::Sender<TransportEvent>) {
        loop {
            let event = match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!(code = ?ack.code, "MQTT connected");
                    TransportEvent::Connected
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(topic = %publish.topic, bytes = publish.payload.len(), "MQTT message");
                    TransportEvent::Message(InboundMessage::new(publish.topic, publish.payload))
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("MQTT disconnect requested, stopping event loop");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    error!(error = %e, retry_ms = self.reconnect_period.as_millis(), "MQTT connection error");
                    if events
                        .send(TransportEvent::Disconnected(e.to_string()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                    tokio::time::sleep(self.reconnect_period).await;
                    continue;
                }
            };

            if events.send(event).await.is_err() {
                warn!("transport event receiver dropped, stopping MQTT event loop");
                break;
            }
        }
    }
}
