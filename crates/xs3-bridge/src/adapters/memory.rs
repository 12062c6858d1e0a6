//! In-memory transport for tests.

use crate::ports::transport::{Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// One recorded publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Bytes,
}

impl Published {
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.payload).ok()
    }
}

/// Records subscriptions and publishes, and forwards every publish to an
/// unbounded channel so a scripted backend can answer.
#[derive(Debug)]
pub struct InMemoryTransport {
    subscriptions: Mutex<Vec<String>>,
    published: Mutex<Vec<Published>>,
    outbox: mpsc::UnboundedSender<Published>,
    fail_publish: AtomicBool,
}

impl InMemoryTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Published>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        let transport = Self {
            subscriptions: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            outbox,
            fail_publish: AtomicBool::new(false),
        };
        (transport, rx)
    }

    /// Make every subsequent publish fail with [`TransportError::NotConnected`]
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().clone()
    }

    /// JSON bodies published to `topic`, oldest first
    pub fn published_to(&self, topic: &str) -> Vec<Value> {
        self.published
            .lock()
            .iter()
            .filter(|p| p.topic == topic)
            .filter_map(Published::json)
            .collect()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn subscribe(&self, pattern: &str) -> Result<(), TransportError> {
        self.subscriptions.lock().push(pattern.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let published = Published {
            topic: topic.to_string(),
            payload,
        };
        self.published.lock().push(published.clone());
        // Nobody listening is fine; the record above is still kept.
        let _ = self.outbox.send(published);
        Ok(())
    }
}
