//! In-process change bus.
//!
//! Stores and the watcher publish typed events; the dashboard bridge and the
//! backup scheduler subscribe. Each subscriber owns a bounded queue; a
//! subscriber that stops draining is dropped with a warning rather than
//! stalling publishers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

/// Queue depth per subscriber. A subscriber more than this many events
/// behind is disconnected.
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    MemoryAdded,
    MemoryUpdated,
    MemoryDeleted,
    TaskAdded,
    TaskUpdated,
    TaskDeleted,
    SettingsChanged,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::MemoryAdded => "memory-added",
            EventKind::MemoryUpdated => "memory-updated",
            EventKind::MemoryDeleted => "memory-deleted",
            EventKind::TaskAdded => "task-added",
            EventKind::TaskUpdated => "task-updated",
            EventKind::TaskDeleted => "task-deleted",
            EventKind::SettingsChanged => "settings-changed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub kind: EventKind,
    pub id: String,
    pub project: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ChangeEvent {
    pub fn new(kind: EventKind, id: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            project: project.into(),
            timestamp: Utc::now(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

struct Subscriber {
    id: usize,
    tx: mpsc::Sender<ChangeEvent>,
    dead: Arc<AtomicBool>,
}

/// Handle returned by [`ChangeBus::subscribe`]; drop it to unsubscribe.
pub struct BusSubscription {
    pub rx: mpsc::Receiver<ChangeEvent>,
    dead: Arc<AtomicBool>,
}

impl BusSubscription {
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        self.dead.store(true, Ordering::Relaxed);
    }
}

#[derive(Default)]
pub struct ChangeBus {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicUsize,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> BusSubscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let dead = Arc::new(AtomicBool::new(false));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subs.retain(|s| !s.dead.load(Ordering::Relaxed));
        subs.push(Subscriber {
            id,
            tx,
            dead: dead.clone(),
        });
        BusSubscription { rx, dead }
    }

    /// Deliver an event to every live subscriber, in subscription order.
    /// Publication takes only a read lock, so concurrent publishers never
    /// serialize on the bus itself.
    pub fn publish(&self, event: ChangeEvent) {
        let subs = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        for sub in subs.iter() {
            if sub.dead.load(Ordering::Relaxed) {
                continue;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        subscriber = sub.id,
                        events_behind = SUBSCRIBER_QUEUE_DEPTH,
                        "dropping slow change-bus subscriber"
                    );
                    sub.dead.store(true, Ordering::Relaxed);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    sub.dead.store(true, Ordering::Relaxed);
                }
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| !s.dead.load(Ordering::Relaxed))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, id: &str) -> ChangeEvent {
        ChangeEvent::new(kind, id, "proj")
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = ChangeBus::new();
        let mut sub = bus.subscribe();
        bus.publish(event(EventKind::MemoryAdded, "a"));
        bus.publish(event(EventKind::MemoryUpdated, "a"));
        assert_eq!(sub.recv().await.unwrap().kind, EventKind::MemoryAdded);
        assert_eq!(sub.recv().await.unwrap().kind, EventKind::MemoryUpdated);
    }

    #[tokio::test]
    async fn each_subscriber_gets_every_event() {
        let bus = ChangeBus::new();
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        bus.publish(event(EventKind::TaskAdded, "t1"));
        assert_eq!(sub1.recv().await.unwrap().id, "t1");
        assert_eq!(sub2.recv().await.unwrap().id, "t1");
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_not_blocking() {
        let bus = ChangeBus::new();
        let _stuck = bus.subscribe(); // never drained
        for i in 0..(SUBSCRIBER_QUEUE_DEPTH + 10) {
            bus.publish(event(EventKind::MemoryAdded, &format!("m{i}")));
        }
        // The stuck subscriber is marked dead once its queue overflows.
        assert_eq!(bus.subscriber_count(), 0);

        // A fresh subscriber still works.
        let mut fresh = bus.subscribe();
        bus.publish(event(EventKind::MemoryDeleted, "x"));
        assert_eq!(fresh.recv().await.unwrap().id, "x");
    }

    #[tokio::test]
    async fn dropped_subscription_is_cleaned_up() {
        let bus = ChangeBus::new();
        let sub = bus.subscribe();
        drop(sub);
        bus.publish(event(EventKind::MemoryAdded, "a"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn event_kinds_serialize_kebab_case() {
        let json = serde_json::to_string(&EventKind::MemoryAdded).unwrap();
        assert_eq!(json, r#""memory-added""#);
        assert_eq!(EventKind::SettingsChanged.as_str(), "settings-changed");
    }
}
