//! Collects commonly-used names for convenient import

pub use crate::{
    config::{Endpoint, EngineConfig, EngineSettings, NetworkIdentity, SaslConfig, SaslMechanismName},
    id::NetworkId,
    orchestrator::{ConnectError, DisconnectError, Orchestrator},
    persistence::{
        ChannelRecord, MemoryPersistence, MessageKind, MessageRecord, Persistence, PersistenceError,
        PersistenceResult,
    },
    session::{Session, SessionLifecycle},
    state::{ChannelState, Member, NetworkState},
    transport::{Connector, LineSender, TcpConnector, Transport, TransportError},
};

pub use kestrel_bus::{Event, EventBus, Subscriber, SubscriptionId, WILDCARD};
