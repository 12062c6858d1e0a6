//! Publish/subscribe transport port.
//!
//! One connection, many logical callers. Inbound traffic is not pulled through
//! this trait; adapters push [`TransportEvent`]s into an mpsc channel that the
//! [`EventListener`](crate::ipc::EventListener) drains.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

/// Message received on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Build a message carrying a JSON body
    pub fn from_json(topic: impl Into<String>, body: &Value) -> Self {
        Self::new(topic, Bytes::from(body.to_string()))
    }

    /// Payload decoded as JSON, `None` when it is not valid JSON
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.payload).ok()
    }
}

/// Connection lifecycle and traffic, in arrival order
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// (Re)connected; the broker session is clean and holds no subscriptions
    Connected,
    Message(InboundMessage),
    Disconnected(String),
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("subscribe to {pattern} failed: {reason}")]
    Subscribe { pattern: String, reason: String },
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("event channel closed")]
    ChannelClosed,
}

/// Single pub/sub connection shared by every component
#[async_trait]
pub trait Transport: Send + Sync {
    async fn subscribe(&self, pattern: &str) -> Result<(), TransportError>;

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Serialize `body` and publish it
    async fn publish_json(&self, topic: &str, body: &Value) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(body)?;
        self.publish(topic, Bytes::from(payload)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inbound_json() {
        let msg = InboundMessage::from_json("xs3/1/U1/q", &json!({"requestId": "r1"}));
        assert_eq!(msg.json(), Some(json!({"requestId": "r1"})));
    }

    #[test]
    fn test_inbound_non_json() {
        let msg = InboundMessage::new("readers/1/s1", Bytes::from_static(b"not json"));
        assert_eq!(msg.json(), None);
    }
}
