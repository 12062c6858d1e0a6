//! Event listener that drains transport events into the bridge.

use crate::bridge::Bridge;
use crate::ports::transport::TransportEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Single dispatch entry point for everything the transport delivers
pub struct EventListener {
    bridge: Arc<Bridge>,
    events: mpsc::Receiver<TransportEvent>,
}

impl EventListener {
    pub fn new(bridge: Arc<Bridge>, events: mpsc::Receiver<TransportEvent>) -> Self {
        Self { bridge, events }
    }

    /// Run the listener loop until every sender is gone
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            if let TransportEvent::Message(message) = &event {
                debug!(topic = %message.topic, "Inbound message");
            }
            self.bridge.handle_event(event);
        }
        info!("Transport event channel closed, stopping listener");
    }
}
