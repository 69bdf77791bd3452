#![allow(dead_code)]

use kestrel_engine::prelude::*;

use async_trait::async_trait;
use kestrel_bus::EventForwarder;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tokio::time::timeout;

pub const NET: NetworkId = NetworkId::new(1);

const WAIT: Duration = Duration::from_secs(5);

/// What the mock connector does when asked for a given endpoint
#[derive(Clone, Copy, Debug)]
pub enum Behaviour {
    Refuse,
    Hang,
    Accept,
}

/// The far end of an accepted connection
pub struct MockServer {
    pub endpoint: Endpoint,
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl MockServer {
    pub async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\r\n").await.unwrap();
    }

    /// Next line written by the client
    pub async fn expect_line(&mut self) -> String {
        timeout(WAIT, self.lines.next_line())
            .await
            .expect("timed out waiting for client line")
            .unwrap()
            .expect("client closed the connection")
    }

    /// Read until the client closes, returning everything it wrote
    pub async fn drain(&mut self) -> Vec<String> {
        let mut seen = Vec::new();
        while let Some(line) = timeout(WAIT, self.lines.next_line())
            .await
            .expect("timed out waiting for close")
            .unwrap()
        {
            seen.push(line);
        }
        seen
    }

    /// Read the registration burst and answer with a welcome
    pub async fn welcome(&mut self, nick: &str) -> Vec<String> {
        let burst = vec![self.expect_line().await, self.expect_line().await];
        self.send(&format!(":irc.test 001 {} :Welcome to the test network", nick)).await;
        burst
    }
}

pub struct MockConnector {
    behaviours: Mutex<HashMap<(String, u16), Behaviour>>,
    attempts: Mutex<Vec<Endpoint>>,
    servers: UnboundedSender<MockServer>,
    /// Notified each time a connection attempt starts
    pub entered: Arc<Notify>,
    /// If set, every attempt waits here before doing anything
    gate: Option<Arc<Notify>>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, UnboundedReceiver<MockServer>) {
        Self::build(None)
    }

    pub fn gated(gate: Arc<Notify>) -> (Arc<Self>, UnboundedReceiver<MockServer>) {
        Self::build(Some(gate))
    }

    fn build(gate: Option<Arc<Notify>>) -> (Arc<Self>, UnboundedReceiver<MockServer>) {
        let (servers, receiver) = unbounded_channel();
        let connector = Self {
            behaviours: Mutex::new(HashMap::new()),
            attempts: Mutex::new(Vec::new()),
            servers,
            entered: Arc::new(Notify::new()),
            gate,
        };
        (Arc::new(connector), receiver)
    }

    pub fn set(&self, address: &str, port: u16, behaviour: Behaviour) {
        self.behaviours.lock().insert((address.to_string(), port), behaviour);
    }

    /// Addresses attempted so far, in order
    pub fn attempts(&self) -> Vec<String> {
        self.attempts
            .lock()
            .iter()
            .map(|e| format!("{}:{}", e.address, e.port))
            .collect()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &Endpoint, _identity: &NetworkIdentity) -> Result<Transport, TransportError> {
        self.attempts.lock().push(endpoint.clone());
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let behaviour = self
            .behaviours
            .lock()
            .get(&(endpoint.address.clone(), endpoint.port))
            .copied()
            .unwrap_or(Behaviour::Refuse);

        match behaviour {
            Behaviour::Refuse => Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into()),
            Behaviour::Hang => futures::future::pending().await,
            Behaviour::Accept => {
                let (client, server) = duplex(16 * 1024);
                let (read, writer) = tokio::io::split(server);
                let server = MockServer {
                    endpoint: endpoint.clone(),
                    lines: BufReader::new(read).lines(),
                    writer,
                };
                self.servers.send(server).map_err(|_| TransportError::Closed)?;
                Ok(Transport::spawn(endpoint.address.clone(), client))
            }
        }
    }
}

pub fn identity(endpoints: Vec<Endpoint>) -> NetworkIdentity {
    NetworkIdentity {
        id: NET,
        name: "TestNet".to_string(),
        endpoints,
        nickname: "alice".to_string(),
        username: "alice".to_string(),
        realname: "Alice Liddell".to_string(),
        password: None,
        sasl: SaslConfig::default(),
        auto_connect: false,
    }
}

pub fn settings(connect_timeout_ms: u64) -> EngineSettings {
    EngineSettings {
        connect_timeout_ms,
        auto_connect_stagger_ms: 200,
        ctcp_version: "kestrel test".to_string(),
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub connector: Arc<MockConnector>,
    pub servers: UnboundedReceiver<MockServer>,
    pub store: Arc<MemoryPersistence>,
    pub events: UnboundedReceiver<Event>,
}

impl Harness {
    pub fn new(connect_timeout_ms: u64) -> Self {
        Self::with_connector(MockConnector::new(), connect_timeout_ms)
    }

    pub fn with_connector(
        (connector, servers): (Arc<MockConnector>, UnboundedReceiver<MockServer>),
        connect_timeout_ms: u64,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let (event_send, events) = unbounded_channel();
        bus.subscribe(WILDCARD, EventForwarder::new(event_send));

        let store = Arc::new(MemoryPersistence::new());
        let orchestrator = Orchestrator::new(
            settings(connect_timeout_ms),
            Arc::clone(&connector) as Arc<dyn Connector>,
            bus,
            Arc::clone(&store) as Arc<dyn Persistence>,
        );

        Self {
            orchestrator,
            connector,
            servers,
            store,
            events,
        }
    }

    pub async fn next_server(&mut self) -> MockServer {
        timeout(WAIT, self.servers.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    /// Skip events until one of the given type arrives
    pub async fn wait_for(&mut self, event_type: &str) -> Event {
        loop {
            let event = timeout(WAIT, self.events.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {}", event_type))
                .expect("event forwarder closed");
            if event.is(event_type) {
                return event;
            }
        }
    }

    pub fn status_lines(&self) -> Vec<String> {
        self.store
            .messages_of_kind(MessageKind::Status)
            .into_iter()
            .map(|m| m.text)
            .collect()
    }
}
