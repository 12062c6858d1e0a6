//! Waiter registry - the "publish then wait for a matching reply" primitive.
//!
//! Flow:
//! 1. Caller registers a predicate and gets a [`Waiter`]
//! 2. Caller publishes its request
//! 3. Every inbound message goes through [`WaiterRegistry::dispatch`], which
//!    tests it against every active predicate (broadcast, not routing)
//! 4. Caller awaits the waiter with a deadline
//!
//! A waiter is resolved at most once and leaves the registry on match, on
//! deadline or when dropped. Predicates must be scoped by a correlation id;
//! an overly broad predicate may match several waiters.

use crate::domain::error::{BridgeError, BridgeResult};
use crate::ports::transport::{InboundMessage, TransportError};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};

type Predicate = Box<dyn Fn(&InboundMessage) -> bool + Send + Sync>;

struct PendingWaiter {
    predicate: Predicate,
    sender: oneshot::Sender<InboundMessage>,
    created_at: Instant,
    label: String,
}

/// Registry statistics
#[derive(Debug, Default)]
pub struct WaiterStats {
    pub registered: AtomicU64,
    pub resolved: AtomicU64,
    pub timed_out: AtomicU64,
    /// Dropped by the caller before resolution (e.g. publish failed)
    pub abandoned: AtomicU64,
}

#[derive(Default)]
pub struct WaiterRegistry {
    waiters: DashMap<u64, PendingWaiter>,
    next_id: AtomicU64,
    stats: WaiterStats,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter. Register BEFORE publishing the request so a fast
    /// reply cannot slip past.
    pub fn register<F>(self: &Arc<Self>, label: impl Into<String>, predicate: F) -> Waiter
    where
        F: Fn(&InboundMessage) -> bool + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let label = label.into();
        let (sender, receiver) = oneshot::channel();

        self.waiters.insert(
            id,
            PendingWaiter {
                predicate: Box::new(predicate),
                sender,
                created_at: Instant::now(),
                label: label.clone(),
            },
        );
        self.stats.registered.fetch_add(1, Ordering::Relaxed);
        trace!(waiter = id, label = %label, "Registered waiter");

        Waiter {
            id,
            label,
            receiver,
            registry: Arc::clone(self),
            settled: false,
        }
    }

    /// Offer an inbound message to every active waiter.
    ///
    /// Returns the number of waiters it resolved.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let matched: Vec<u64> = self
            .waiters
            .iter()
            .filter(|entry| (entry.predicate)(message))
            .map(|entry| *entry.key())
            .collect();

        let mut resolved = 0;
        for id in matched {
            let Some((_, waiter)) = self.waiters.remove(&id) else {
                continue;
            };
            let elapsed = waiter.created_at.elapsed();
            if waiter.sender.send(message.clone()).is_ok() {
                self.stats.resolved.fetch_add(1, Ordering::Relaxed);
                resolved += 1;
                debug!(
                    waiter = id,
                    label = %waiter.label,
                    topic = %message.topic,
                    elapsed_ms = elapsed.as_millis(),
                    "Resolved waiter"
                );
            } else {
                self.stats.abandoned.fetch_add(1, Ordering::Relaxed);
            }
        }
        resolved
    }

    /// Register, then wait. Only safe when the matching message is produced
    /// after this call starts, e.g. unsolicited events.
    pub async fn await_match<F>(
        self: &Arc<Self>,
        label: impl Into<String>,
        predicate: F,
        timeout: Duration,
    ) -> BridgeResult<InboundMessage>
    where
        F: Fn(&InboundMessage) -> bool + Send + Sync + 'static,
    {
        self.register(label, predicate).wait(timeout).await
    }

    /// Get number of currently active waiters
    pub fn pending_count(&self) -> usize {
        self.waiters.len()
    }

    pub fn stats(&self) -> &WaiterStats {
        &self.stats
    }

    fn unregister(&self, id: u64) -> bool {
        self.waiters.remove(&id).is_some()
    }
}

/// Handle on one registered waiter
pub struct Waiter {
    id: u64,
    label: String,
    receiver: oneshot::Receiver<InboundMessage>,
    registry: Arc<WaiterRegistry>,
    settled: bool,
}

impl Waiter {
    /// Wait for the first matching message, at most `timeout`
    pub async fn wait(mut self, timeout: Duration) -> BridgeResult<InboundMessage> {
        let outcome = tokio::time::timeout(timeout, &mut self.receiver).await;
        self.settled = true;

        match outcome {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(TransportError::ChannelClosed.into()),
            Err(_) => {
                if self.registry.unregister(self.id) {
                    self.registry.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                    debug!(waiter = self.id, label = %self.label, "Waiter timed out");
                    return Err(BridgeError::timeout(self.label.clone(), timeout));
                }
                // Claimed by dispatch at the deadline; its send is imminent
                (&mut self.receiver)
                    .await
                    .map_err(|_| BridgeError::timeout(self.label.clone(), timeout))
            }
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if !self.settled && self.registry.unregister(self.id) {
            self.registry.stats.abandoned.fetch_add(1, Ordering::Relaxed);
            trace!(waiter = self.id, label = %self.label, "Waiter dropped before resolution");
        }
    }
}
