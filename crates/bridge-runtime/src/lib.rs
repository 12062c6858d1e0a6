//! # Bridge Runtime Library
//!
//! Wires the MQTT adapter, the bridge context and the event listener
//! together. The main entry point is the `main.rs` binary.

pub mod config;

pub use config::{from_lookup, load_config};

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};
use xs3_bridge::adapters::mqtt::{self, MqttTransport};
use xs3_bridge::{Bridge, BridgeConfig, EventListener};

/// Capacity of the transport event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Running bridge: broker connection, event loop and the bridge context
pub struct BridgeRuntime {
    bridge: Arc<Bridge>,
    transport: Arc<MqttTransport>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl BridgeRuntime {
    /// Validate the configuration, connect and start the event loop
    pub fn start(config: BridgeConfig) -> Result<Self> {
        let (transport, connection) =
            mqtt::connect(&config.mqtt).context("Failed to set up MQTT connection")?;
        let transport = Arc::new(transport);
        let bridge = Arc::new(
            Bridge::new(config, transport.clone()).context("Invalid bridge configuration")?,
        );

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let connection_task = tokio::spawn(async move {
            tokio::select! {
                _ = connection.run(events_tx) => {}
                _ = shutdown_rx.changed() => info!("Connection loop stopped"),
            }
        });
        let listener_task =
            tokio::spawn(EventListener::new(Arc::clone(&bridge), events_rx).run());

        info!(
            host = %bridge.config().mqtt.host,
            port = bridge.config().mqtt.port,
            station_id = %bridge.config().station_id,
            version = xs3_bridge::VERSION,
            "Bridge started"
        );

        Ok(Self {
            bridge,
            transport,
            shutdown_tx,
            tasks: vec![connection_task, listener_task],
        })
    }

    pub fn bridge(&self) -> Arc<Bridge> {
        Arc::clone(&self.bridge)
    }

    /// Disconnect from the broker and stop the event loop
    pub async fn shutdown(self) {
        info!("Initiating graceful shutdown...");
        if let Err(e) = self.transport.disconnect().await {
            error!(error = %e, "Broker disconnect failed");
        }
        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }
        for task in self.tasks {
            if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
                error!("Task did not stop in time");
            }
        }
        info!("Shutdown complete");
    }
}
