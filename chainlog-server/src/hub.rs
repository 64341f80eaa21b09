//! LogHub — live entry distribution to WebSocket subscribers
//!
//! ```text
//! LogStore.append ──publish──▶ EventBus topic
//!                                   │ (listener task)
//!                                   ▼
//!                                LogHub
//!                                   ├── connections: id → Subscriber (mpsc)
//!                                   └── by_subject / unfiltered routing sets
//!                                           │
//!                                           ▼
//!                                WS handler (forward mpsc → socket)
//! ```
//!
//! Each subscriber gets a bounded per-connection queue. A full queue
//! drops the message for that subscriber only; a closed queue removes
//! the subscriber from every routing set.

use chrono::Utc;
use parking_lot::Mutex;
use shared::stream::StreamMessage;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Per-connection queue depth; a slow reader buffers this many
/// serialized messages before losing new ones
const SUBSCRIBER_CAPACITY: usize = 64;

struct Subscriber {
    tx: mpsc::Sender<String>,
    subject_filter: Option<String>,
}

#[derive(Default)]
struct HubInner {
    connections: HashMap<u64, Subscriber>,
    /// Subscribers watching one subject
    by_subject: HashMap<String, HashSet<u64>>,
    /// Subscribers watching everything
    unfiltered: HashSet<u64>,
}

impl HubInner {
    fn remove(&mut self, id: u64) {
        if let Some(sub) = self.connections.remove(&id) {
            match sub.subject_filter {
                Some(subject) => {
                    if let Some(set) = self.by_subject.get_mut(&subject) {
                        set.remove(&id);
                        if set.is_empty() {
                            self.by_subject.remove(&subject);
                        }
                    }
                }
                None => {
                    self.unfiltered.remove(&id);
                }
            }
        }
    }
}

/// Fan-out hub for live log entry pushes
#[derive(Default)]
pub struct LogHub {
    inner: Mutex<HubInner>,
    next_id: AtomicU64,
}

impl LogHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber, optionally scoped to one subject.
    ///
    /// Registration is effective immediately: entries broadcast after
    /// this call (and before the caller drains the receiver) queue up,
    /// so register-then-snapshot never misses a write.
    pub fn subscribe(&self, subject_filter: Option<String>) -> (u64, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.lock();
        match &subject_filter {
            Some(subject) => {
                inner.by_subject.entry(subject.clone()).or_default().insert(id);
            }
            None => {
                inner.unfiltered.insert(id);
            }
        }
        inner.connections.insert(id, Subscriber { tx, subject_filter });

        (id, rx)
    }

    /// Drop a subscriber from every routing set
    pub fn unsubscribe(&self, id: u64) {
        self.inner.lock().remove(id);
    }

    pub fn active_connections(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Deliver a serialized entry to the unfiltered subscribers and to
    /// those watching `subject_id`
    pub fn broadcast(&self, subject_id: &str, message: &str) {
        let mut inner = self.inner.lock();
        let targets: Vec<u64> = inner
            .unfiltered
            .iter()
            .chain(inner.by_subject.get(subject_id).into_iter().flatten())
            .copied()
            .collect();
        self.deliver(&mut inner, &targets, message);
    }

    /// Deliver a message to every subscriber regardless of filter
    pub fn broadcast_all(&self, message: &str) {
        let mut inner = self.inner.lock();
        let targets: Vec<u64> = inner.connections.keys().copied().collect();
        self.deliver(&mut inner, &targets, message);
    }

    fn deliver(&self, inner: &mut HubInner, targets: &[u64], message: &str) {
        let mut dead = Vec::new();
        for &id in targets {
            let Some(sub) = inner.connections.get(&id) else {
                continue;
            };
            match sub.tx.try_send(message.to_string()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Slow reader: this subscriber loses the message,
                    // everyone else still gets it
                    tracing::warn!(subscriber = id, "subscriber queue full, dropping message");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(id);
                }
            }
        }
        for id in dead {
            inner.remove(id);
        }
    }

    /// Periodic liveness signal to every open connection
    pub async fn heartbeat_loop(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick completes immediately
        loop {
            ticker.tick().await;
            let heartbeat = StreamMessage::Heartbeat {
                timestamp: Utc::now(),
                active_connections: self.active_connections(),
            };
            match serde_json::to_string(&heartbeat) {
                Ok(json) => self.broadcast_all(&json),
                Err(e) => tracing::error!("failed to serialize heartbeat: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unfiltered_subscriber_sees_every_subject() {
        let hub = LogHub::new();
        let (_id, mut rx) = hub.subscribe(None);

        hub.broadcast("alice", "a1");
        hub.broadcast("bob", "b1");
        hub.broadcast("alice", "a2");

        assert_eq!(rx.recv().await.unwrap(), "a1");
        assert_eq!(rx.recv().await.unwrap(), "b1");
        assert_eq!(rx.recv().await.unwrap(), "a2");
    }

    #[tokio::test]
    async fn filtered_subscriber_sees_only_its_subject() {
        let hub = LogHub::new();
        let (_id, mut rx) = hub.subscribe(Some("alice".into()));

        hub.broadcast("bob", "b1");
        hub.broadcast("alice", "a1");

        assert_eq!(rx.recv().await.unwrap(), "a1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_fans_out_to_matching_subscribers() {
        let hub = LogHub::new();
        let (_i1, mut all) = hub.subscribe(None);
        let (_i2, mut alice) = hub.subscribe(Some("alice".into()));
        let (_i3, mut bob) = hub.subscribe(Some("bob".into()));

        hub.broadcast("alice", "msg");

        assert_eq!(all.recv().await.unwrap(), "msg");
        assert_eq!(alice.recv().await.unwrap(), "msg");
        assert!(bob.try_recv().is_err());
    }

    #[test]
    fn unsubscribe_stops_delivery_and_updates_count() {
        let hub = LogHub::new();
        let (id, mut rx) = hub.subscribe(Some("alice".into()));
        assert_eq!(hub.active_connections(), 1);

        hub.unsubscribe(id);
        assert_eq!(hub.active_connections(), 0);

        hub.broadcast("alice", "late");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_is_pruned_on_next_broadcast() {
        let hub = LogHub::new();
        let (_id, rx) = hub.subscribe(Some("alice".into()));
        drop(rx);
        assert_eq!(hub.active_connections(), 1);

        hub.broadcast("alice", "msg");
        assert_eq!(hub.active_connections(), 0);

        // Routing sets are clean too; another broadcast hits nothing
        hub.broadcast("alice", "msg");
    }

    #[tokio::test]
    async fn full_queue_drops_for_that_subscriber_only() {
        let hub = LogHub::new();
        let (_slow_id, mut slow) = hub.subscribe(None);
        let (_ok_id, mut ok) = hub.subscribe(None);

        // Drain the healthy subscriber as we go; the slow one never reads
        for i in 0..SUBSCRIBER_CAPACITY + 5 {
            hub.broadcast("alice", &format!("m{i}"));
            assert_eq!(ok.recv().await.unwrap(), format!("m{i}"));
        }
        // The slow one kept its first CAPACITY messages and stays subscribed
        assert_eq!(slow.recv().await.unwrap(), "m0");
        assert_eq!(hub.active_connections(), 2);
    }

    #[tokio::test]
    async fn broadcast_all_ignores_filters() {
        let hub = LogHub::new();
        let (_i1, mut alice) = hub.subscribe(Some("alice".into()));
        let (_i2, mut bob) = hub.subscribe(Some("bob".into()));

        hub.broadcast_all("heartbeat");

        assert_eq!(alice.recv().await.unwrap(), "heartbeat");
        assert_eq!(bob.recv().await.unwrap(), "heartbeat");
    }
}
