//! Store event notifications
//!
//! A small typed publish/subscribe contract. Consumers subscribe by topic
//! and are invoked synchronously in registration order; delivery is
//! best-effort and in-process only. Dropping the returned [`Subscription`]
//! unregisters the handler, so there is no manual unsubscribe call to
//! forget.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::record::RecordId;

/// Subscription key for [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    RecordCreated,
    RecordUpdated,
    RecordDeleted,
    RecordsConnected,
    PromotedToLongTerm,
    StoreInitialized,
    StoreOptimized,
}

/// A notification emitted by the store
#[derive(Debug, Clone)]
pub enum MemoryEvent {
    RecordCreated {
        id: RecordId,
        at: DateTime<Utc>,
    },
    RecordUpdated {
        id: RecordId,
        at: DateTime<Utc>,
    },
    RecordDeleted {
        id: RecordId,
        at: DateTime<Utc>,
    },
    RecordsConnected {
        a: RecordId,
        b: RecordId,
        at: DateTime<Utc>,
    },
    PromotedToLongTerm {
        id: RecordId,
        at: DateTime<Utc>,
    },
    StoreInitialized {
        records: usize,
        at: DateTime<Utc>,
    },
    StoreOptimized {
        evicted: usize,
        at: DateTime<Utc>,
    },
}

impl MemoryEvent {
    /// The topic this event is delivered under
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::RecordCreated { .. } => EventTopic::RecordCreated,
            Self::RecordUpdated { .. } => EventTopic::RecordUpdated,
            Self::RecordDeleted { .. } => EventTopic::RecordDeleted,
            Self::RecordsConnected { .. } => EventTopic::RecordsConnected,
            Self::PromotedToLongTerm { .. } => EventTopic::PromotedToLongTerm,
            Self::StoreInitialized { .. } => EventTopic::StoreInitialized,
            Self::StoreOptimized { .. } => EventTopic::StoreOptimized,
        }
    }

    /// When the event happened
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::RecordCreated { at, .. }
            | Self::RecordUpdated { at, .. }
            | Self::RecordDeleted { at, .. }
            | Self::RecordsConnected { at, .. }
            | Self::PromotedToLongTerm { at, .. }
            | Self::StoreInitialized { at, .. }
            | Self::StoreOptimized { at, .. } => *at,
        }
    }
}

type Handler = Arc<dyn Fn(&MemoryEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    subscribers: DashMap<EventTopic, Vec<(u64, Handler)>>,
    next_id: AtomicU64,
}

/// In-process event bus keyed by [`EventTopic`]
///
/// Cheap to clone; clones share one subscriber registry.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one topic
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// dropped.
    pub fn subscribe(
        &self,
        topic: EventTopic,
        handler: impl Fn(&MemoryEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            bus: Arc::downgrade(&self.inner),
            topic,
            id,
        }
    }

    /// Deliver an event to its topic's subscribers, in registration order
    pub fn publish(&self, event: &MemoryEvent) {
        // Handlers are cloned out before invocation so a handler may touch
        // the bus (or the store) without deadlocking on the shard lock.
        let handlers: Vec<Handler> = match self.inner.subscribers.get(&event.topic()) {
            Some(entry) => entry.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return,
        };
        for handler in handlers {
            handler(event);
        }
    }

    /// Number of live subscriptions for a topic
    pub fn subscriber_count(&self, topic: EventTopic) -> usize {
        self.inner
            .subscribers
            .get(&topic)
            .map(|e| e.len())
            .unwrap_or(0)
    }
}

/// RAII handle for a registered event handler
///
/// Dropping the handle unregisters the handler. Outliving the bus is fine;
/// the weak reference simply no-ops.
pub struct Subscription {
    bus: Weak<BusInner>,
    topic: EventTopic,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            if let Some(mut entry) = bus.subscribers.get_mut(&self.topic) {
                entry.retain(|(handler_id, _)| *handler_id != self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn created_event() -> MemoryEvent {
        MemoryEvent::RecordCreated {
            id: RecordId::new(),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_publish_reaches_topic_subscribers() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        let _sub = bus.subscribe(EventTopic::RecordCreated, move |event| {
            seen_clone.lock().unwrap().push(event.topic());
        });

        bus.publish(&created_event());
        bus.publish(&MemoryEvent::StoreOptimized {
            evicted: 0,
            at: Utc::now(),
        });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[EventTopic::RecordCreated]);
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&order);
        let _a = bus.subscribe(EventTopic::RecordCreated, move |_| {
            first.lock().unwrap().push(1);
        });
        let second = Arc::clone(&order);
        let _b = bus.subscribe(EventTopic::RecordCreated, move |_| {
            second.lock().unwrap().push(2);
        });

        bus.publish(&created_event());
        assert_eq!(order.lock().unwrap().as_slice(), &[1, 2]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventTopic::RecordCreated, |_| {});
        assert_eq!(bus.subscriber_count(EventTopic::RecordCreated), 1);

        drop(sub);
        assert_eq!(bus.subscriber_count(EventTopic::RecordCreated), 0);
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventTopic::RecordDeleted, |_| {});
        drop(bus);
        drop(sub); // must not panic
    }
}
