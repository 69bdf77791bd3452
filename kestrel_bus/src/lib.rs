//! An in-process publish/subscribe hub.
//!
//! The session engine publishes every state change it observes as an [`Event`];
//! consumers (UI forwarders, plugin routers, loggers) register a [`Subscriber`]
//! against an event type, or against [`WILDCARD`] to see everything.
//!
//! Asynchronous delivery through [`EventBus::publish`] never blocks the publisher.
//! Each registration owns a FIFO queue drained by its own worker task, so a given
//! subscriber observes events in the order they were published. No ordering is
//! implied between different subscribers.

mod event;
pub use event::*;

mod subscriber;
pub use subscriber::*;

mod bus;
pub use bus::*;
