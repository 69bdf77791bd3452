//! Session engine for IRC networks.
//!
//! The [`Orchestrator`] connects identities to networks, falling back across
//! endpoints. Each live [`Session`] negotiates capabilities and SASL through a
//! [`capability::Negotiator`], turns server lines into state changes with the
//! [`processor::Processor`], and publishes what happened on a
//! [`kestrel_bus::EventBus`].

pub mod prelude;

pub mod id;
pub mod config;
pub mod tracing_config;

pub mod message;
pub mod numeric;
pub mod ctcp;

pub mod state;
pub mod outcome;
pub mod persistence;

pub mod transport;
pub mod capability;
pub mod processor;

pub mod session;
pub use session::{Session, SessionLifecycle};

pub mod orchestrator;
pub use orchestrator::{ConnectError, DisconnectError, Orchestrator};

pub mod utils;
