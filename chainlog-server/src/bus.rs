//! Event bus — cross-process publish/subscribe seam
//!
//! The log store publishes each stored entry on a topic; a listener
//! task re-broadcasts it to live WebSocket subscribers. The trait keeps
//! the single-process broadcaster and a future external pub/sub system
//! interchangeable behind the same contract.

use dashmap::DashMap;
use tokio::sync::broadcast;

/// Topic carrying every stored entry, serialized as JSON
pub const LOG_UPDATES_TOPIC: &str = "log_updates";

/// Channel capacity per topic — enough to absorb connection-time bursts
const TOPIC_CAPACITY: usize = 1024;

/// Publish/subscribe seam between the store and the distribution hub
pub trait EventBus: Send + Sync {
    /// Publish a message on a topic. Lossy by contract: delivery to
    /// zero subscribers is not an error.
    fn publish(&self, topic: &str, message: String);

    /// Subscribe to a topic, receiving messages published after this
    /// call.
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<String>;
}

/// Single-process event bus backed by tokio broadcast channels
#[derive(Default)]
pub struct InMemoryBus {
    topics: DashMap<String, broadcast::Sender<String>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn topic_sender(&self, topic: &str) -> broadcast::Sender<String> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

impl EventBus for InMemoryBus {
    fn publish(&self, topic: &str, message: String) {
        // send returns Err when there are no subscribers; safe to ignore
        let _ = self.topic_sender(topic).send(message);
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        self.topic_sender(topic).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_messages_in_order() {
        let bus = InMemoryBus::new();
        let mut rx = bus.subscribe("t");

        bus.publish("t", "one".into());
        bus.publish("t", "two".into());

        assert_eq!(rx.recv().await.unwrap(), "one");
        assert_eq!(rx.recv().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = InMemoryBus::new();
        let mut a = bus.subscribe("a");
        let mut b = bus.subscribe("b");

        bus.publish("a", "for-a".into());
        bus.publish("b", "for-b".into());

        assert_eq!(a.recv().await.unwrap(), "for-a");
        assert_eq!(b.recv().await.unwrap(), "for-b");
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = InMemoryBus::new();
        bus.publish("nobody-listening", "dropped".into());
    }
}
