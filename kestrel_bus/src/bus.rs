use crate::{Event, Subscriber};

use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

/// Event type which matches every published event
pub const WILDCARD: &str = "*";

/// Identifies one registration made through [`EventBus::subscribe`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    event_type: String,
    subscriber: Arc<dyn Subscriber>,
    queue: UnboundedSender<Arc<Event>>,
}

impl Registration {
    fn matches(&self, event_type: &str) -> bool {
        self.event_type == WILDCARD || self.event_type == event_type
    }
}

/// The publish/subscribe hub.
///
/// Registrations are kept in registration order. Each one is backed by an
/// unbounded FIFO and a worker task which drains it, so [`EventBus::subscribe`]
/// must be called from within a tokio runtime.
pub struct EventBus {
    registrations: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `subscriber` for events of type `event_type`, or for every event
    /// if `event_type` is [`WILDCARD`].
    pub fn subscribe(&self, event_type: impl Into<String>, subscriber: impl Subscriber) -> SubscriptionId {
        self.subscribe_shared(event_type, Arc::new(subscriber))
    }

    /// As [`subscribe`](Self::subscribe), for a subscriber that is shared with other code
    pub fn subscribe_shared(
        &self,
        event_type: impl Into<String>,
        subscriber: Arc<dyn Subscriber>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let event_type = event_type.into();

        let (queue, mut pending) = unbounded_channel::<Arc<Event>>();
        let worker_subscriber = Arc::clone(&subscriber);
        tokio::spawn(async move {
            while let Some(event) = pending.recv().await {
                worker_subscriber.on_event(&event);
            }
        });

        tracing::trace!(?id, %event_type, "new subscription");

        self.registrations.write().push(Registration {
            id,
            event_type,
            subscriber,
            queue,
        });

        id
    }

    /// Remove a registration. Events already queued for it are still delivered.
    ///
    /// Returns false if the registration did not exist.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        before != registrations.len()
    }

    /// Queue `event` for every matching registration and return without waiting
    /// for delivery.
    pub fn publish(&self, event: Event) {
        let event = Arc::new(event);

        for registration in self.registrations.read().iter() {
            if registration.matches(&event.event_type)
                && registration.queue.send(Arc::clone(&event)).is_err()
            {
                tracing::warn!(id = ?registration.id, event_type = %event.event_type,
                    "delivery worker has stopped; dropping event");
            }
        }
    }

    /// Deliver `event` to every matching subscriber on the caller's context, in
    /// registration order, returning once all of them have run.
    pub fn publish_sync(&self, event: Event) {
        let targets: Vec<Arc<dyn Subscriber>> = self
            .registrations
            .read()
            .iter()
            .filter(|r| r.matches(&event.event_type))
            .map(|r| Arc::clone(&r.subscriber))
            .collect();

        for subscriber in targets {
            subscriber.on_event(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registrations.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
