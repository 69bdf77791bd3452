//! Connection management across networks.

use crate::capability::Negotiator;
use crate::config::{EngineSettings, Endpoint, NetworkIdentity};
use crate::id::NetworkId;
use crate::outcome::network_event;
use crate::persistence::{MessageRecord, Persistence};
use crate::processor::{HandlerContext, Processor};
use crate::session::{Session, SessionLifecycle};
use crate::state::NetworkState;
use crate::transport::{Connector, Transport, TransportError};
use crate::utils::OrLog;

use kestrel_bus::EventBus;

use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Network {0} is already connecting")]
    AlreadyConnecting(NetworkId),
    #[error("Network {0} is already connected")]
    AlreadyConnected(NetworkId),
    #[error("Network {0} has no endpoints")]
    NoEndpoints(NetworkId),
    #[error("Every endpoint of network {network} failed; last error: {last}")]
    AllEndpointsFailed { network: NetworkId, last: TransportError },
}

#[derive(Debug, Error)]
pub enum DisconnectError {
    #[error("Network {0} is not connected")]
    NotConnected(NetworkId),
    #[error("Network {0} is still connecting")]
    StillConnecting(NetworkId),
}

enum Slot {
    Connecting,
    Live(Arc<Session>),
}

type Registry = Arc<RwLock<HashMap<NetworkId, Slot>>>;

/// Marks a network as connecting for as long as it lives. Unless a session is
/// bound through it, dropping the guard frees the network again, so an
/// attempt abandoned at any await point doesn't lock the network out.
struct ConnectGuard {
    registry: Registry,
    network: NetworkId,
    bound: bool,
}

impl ConnectGuard {
    fn bind(mut self, session: Arc<Session>) {
        self.registry.write().insert(self.network, Slot::Live(session));
        self.bound = true;
    }
}

impl Drop for ConnectGuard {
    fn drop(&mut self) {
        if self.bound {
            return;
        }
        let mut registry = self.registry.write();
        if matches!(registry.get(&self.network), Some(Slot::Connecting)) {
            registry.remove(&self.network);
        }
    }
}

/// Owns the live sessions, at most one per network.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct Orchestrator {
    settings: Arc<EngineSettings>,
    connector: Arc<dyn Connector>,
    bus: Arc<EventBus>,
    store: Arc<dyn Persistence>,
    processor: Arc<Processor>,
    registry: Registry,
}

impl Orchestrator {
    pub fn new(
        settings: EngineSettings,
        connector: Arc<dyn Connector>,
        bus: Arc<EventBus>,
        store: Arc<dyn Persistence>,
    ) -> Self {
        let processor = Processor::new(HandlerContext::from(&settings));

        Self {
            settings: Arc::new(settings),
            connector,
            bus,
            store,
            processor: Arc::new(processor),
            registry: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn acquire(&self, network: NetworkId) -> Result<ConnectGuard, ConnectError> {
        let mut registry = self.registry.write();

        match registry.get(&network) {
            Some(Slot::Connecting) => return Err(ConnectError::AlreadyConnecting(network)),
            Some(Slot::Live(session)) if session.is_connected() => {
                return Err(ConnectError::AlreadyConnected(network))
            }
            _ => (),
        }

        registry.insert(network, Slot::Connecting);
        Ok(ConnectGuard {
            registry: Arc::clone(&self.registry),
            network,
            bound: false,
        })
    }

    /// Connect to the first endpoint of `identity` that accepts, in priority
    /// order.
    ///
    /// Each attempt is bounded by the configured connect timeout. Once one
    /// succeeds the session's read loop is started and this returns without
    /// waiting for registration. Fails immediately if the network is already
    /// connecting or connected.
    pub async fn connect(&self, identity: NetworkIdentity) -> Result<Arc<Session>, ConnectError> {
        let network = identity.id;
        let guard = self.acquire(network)?;

        let endpoints = identity.endpoints_by_priority();
        let mut last_error = None;

        for endpoint in endpoints {
            tracing::info!(network = %identity.name, %endpoint, "connecting");

            let attempt = tokio::time::timeout(
                self.settings.connect_timeout(),
                self.connector.connect(&endpoint, &identity),
            )
            .await;

            let error = match attempt {
                Ok(Ok(transport)) => return Ok(self.bind(guard, identity, endpoint, transport)),
                Ok(Err(e)) => e,
                Err(_) => TransportError::Timeout,
            };

            tracing::warn!(network = %identity.name, %endpoint, "connection attempt failed: {}", error);
            self.store
                .write_message(MessageRecord::status(
                    network,
                    format!("Could not connect to {}: {}", endpoint, error),
                ))
                .or_log("writing status record");
            last_error = Some(error);
        }

        Err(match last_error {
            Some(last) => ConnectError::AllEndpointsFailed { network, last },
            None => ConnectError::NoEndpoints(network),
        })
    }

    fn bind(&self, guard: ConnectGuard, identity: NetworkIdentity, endpoint: Endpoint, transport: Transport) -> Arc<Session> {
        let Transport { sender, lines } = transport;
        let network = identity.id;

        let mut state = NetworkState::new(network, endpoint.address.clone(), identity.nickname.clone());
        match self.store.channels(network) {
            Ok(records) => state.seed_channels(&records),
            Err(e) => tracing::error!(network = %identity.name, "couldn't load stored channels: {}", e),
        }
        let established = network_event(&state, "connection.established");

        let mut negotiator = Negotiator::new(identity.sasl.clone());
        let session = Arc::new(Session::new(
            identity,
            endpoint,
            sender,
            state,
            Arc::clone(&self.bus),
            Arc::clone(&self.store),
        ));
        session.register(&mut negotiator);
        guard.bind(Arc::clone(&session));

        tracing::info!(network = %session.identity().name, endpoint = %session.endpoint(), "connected");
        self.store
            .write_message(MessageRecord::status(
                network,
                format!("Connected to {}", session.endpoint()),
            ))
            .or_log("writing status record");
        self.bus.publish(established);

        let registry = Arc::clone(&self.registry);
        let processor = Arc::clone(&self.processor);
        let task_session = Arc::clone(&session);
        tokio::spawn(async move {
            task_session.run(lines, negotiator, processor).await;
            release(&registry, network, &task_session);
        });

        session
    }

    /// Gracefully leave a network: send `QUIT`, tear the session down and
    /// forget it. The read loop notices the closed connection by itself.
    pub fn disconnect(&self, network: NetworkId) -> Result<(), DisconnectError> {
        self.disconnect_with_reason(network, None)
    }

    pub fn disconnect_with_reason(&self, network: NetworkId, reason: Option<&str>) -> Result<(), DisconnectError> {
        let session = {
            let mut registry = self.registry.write();
            match registry.remove(&network) {
                Some(Slot::Live(session)) => session,
                Some(Slot::Connecting) => {
                    registry.insert(network, Slot::Connecting);
                    return Err(DisconnectError::StillConnecting(network));
                }
                None => return Err(DisconnectError::NotConnected(network)),
            }
        };

        tracing::info!(network = %session.identity().name, "disconnecting");
        session.tear_down(reason);
        Ok(())
    }

    /// Disconnect every live session
    pub fn disconnect_all(&self, reason: Option<&str>) {
        let networks: Vec<NetworkId> = self
            .registry
            .read()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Live(_)))
            .map(|(id, _)| *id)
            .collect();

        for network in networks {
            self.disconnect_with_reason(network, reason)
                .or_log(format_args!("disconnecting network {}", network));
        }
    }

    pub fn session(&self, network: NetworkId) -> Option<Arc<Session>> {
        match self.registry.read().get(&network) {
            Some(Slot::Live(session)) => Some(Arc::clone(session)),
            _ => None,
        }
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.registry
            .read()
            .values()
            .filter_map(|slot| match slot {
                Slot::Live(session) => Some(Arc::clone(session)),
                Slot::Connecting => None,
            })
            .collect()
    }

    pub fn lifecycle(&self, network: NetworkId) -> SessionLifecycle {
        match self.registry.read().get(&network) {
            Some(Slot::Connecting) => SessionLifecycle::Connecting,
            Some(Slot::Live(session)) => session.lifecycle(),
            None => SessionLifecycle::Disconnected,
        }
    }

    /// Connect every identity flagged for auto-connect, one network per
    /// stagger interval. Tasks that haven't started when `cancel` fires exit
    /// without attempting anything.
    pub fn auto_connect(&self, identities: Vec<NetworkIdentity>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let stagger = self.settings.auto_connect_stagger();

        identities
            .into_iter()
            .filter(|identity| identity.auto_connect)
            .enumerate()
            .map(|(index, identity)| {
                let orchestrator = self.clone();
                let cancel = cancel.clone();
                let delay = stagger * index as u32;

                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            tracing::debug!(network = %identity.name, "auto-connect cancelled");
                            return;
                        }
                        _ = tokio::time::sleep(delay) => (),
                    }
                    if cancel.is_cancelled() {
                        return;
                    }

                    let name = identity.name.clone();
                    match orchestrator.connect(identity).await {
                        Ok(session) => tracing::info!(network = %name, endpoint = %session.endpoint(), "auto-connected"),
                        Err(e) => tracing::warn!(network = %name, "auto-connect failed: {}", e),
                    }
                })
            })
            .collect()
    }
}

/// Forget a session whose read loop has ended, unless it has already been
/// replaced
fn release(registry: &Registry, network: NetworkId, session: &Arc<Session>) {
    let mut registry = registry.write();
    if let Some(Slot::Live(current)) = registry.get(&network) {
        if Arc::ptr_eq(current, session) {
            registry.remove(&network);
        }
    }
}
