use crate::Event;

use tokio::sync::mpsc::UnboundedSender;

/// Something that wants to be told about published events.
///
/// `on_event` runs on the subscriber's delivery worker for asynchronous
/// publication, or on the publisher's own context for
/// [`EventBus::publish_sync`](crate::EventBus::publish_sync). It should not block
/// for long in either case.
pub trait Subscriber: Send + Sync + 'static {
    fn on_event(&self, event: &Event);
}

impl<F> Subscriber for F
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// A subscriber which forwards a copy of every event into a channel, for
/// consumers that live on their own task.
pub struct EventForwarder {
    sender: UnboundedSender<Event>,
}

impl EventForwarder {
    pub fn new(sender: UnboundedSender<Event>) -> Self {
        Self { sender }
    }
}

impl Subscriber for EventForwarder {
    fn on_event(&self, event: &Event) {
        if self.sender.send(event.clone()).is_err() {
            tracing::trace!(event_type = %event.event_type, "forwarding receiver has gone away");
        }
    }
}
