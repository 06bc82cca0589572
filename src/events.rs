use crate::error::{LimitsError, Result};
use log::debug;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Inbound: a document's extracted fields changed.
pub const TOPIC_FIELDS_UPDATED: &str = "FIELDS_UPDATED";
/// Outbound: a recalculation run completed and snapshots were written.
pub const TOPIC_LIMITS_RECALCULATED: &str = "LIMITS_RECALCULATED";

pub type EventHandler = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Abstract pub/sub capability at the engine boundary. Any message queue or
/// in-process channel satisfies this; delivery guarantees and retries are the
/// transport's concern, not the engine's. The engine's runs are idempotent,
/// so at-least-once delivery of inbound triggers is safe.
pub trait EventBus: Send + Sync {
    fn publish(&self, topic: &str, payload: &serde_json::Value) -> Result<()>;

    fn subscribe(&self, topic: &str, handler: EventHandler);
}

/// Synchronous in-process bus: publish invokes every subscriber for the topic
/// before returning. Suitable for tests and single-process deployments.
#[derive(Default)]
pub struct InProcessEventBus {
    subscribers: RwLock<BTreeMap<String, Vec<EventHandler>>>,
}

impl InProcessEventBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventBus for InProcessEventBus {
    fn publish(&self, topic: &str, payload: &serde_json::Value) -> Result<()> {
        let subscribers = self.subscribers.read();
        let handlers = subscribers.get(topic).map(Vec::as_slice).unwrap_or(&[]);

        debug!(
            "Publishing to '{}' ({} subscriber(s))",
            topic,
            handlers.len()
        );
        for handler in handlers {
            handler(payload);
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str, handler: EventHandler) {
        self.subscribers
            .write()
            .entry(topic.to_string())
            .or_default()
            .push(handler);
    }
}

/// A bus whose publishes always fail. Exercises the best-effort emit path:
/// a recalculation must still succeed when the notification channel is down.
pub struct UnavailableEventBus;

impl EventBus for UnavailableEventBus {
    fn publish(&self, topic: &str, _payload: &serde_json::Value) -> Result<()> {
        Err(LimitsError::EventPublish {
            topic: topic.to_string(),
            details: "event channel unavailable".to_string(),
        })
    }

    fn subscribe(&self, _topic: &str, _handler: EventHandler) {}
}
