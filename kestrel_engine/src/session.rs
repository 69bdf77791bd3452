//! A live connection to one network, and the task that reads from it.

use crate::capability::Negotiator;
use crate::config::{Endpoint, NetworkIdentity};
use crate::id::NetworkId;
use crate::message::InboundMessage;
use crate::outcome::{network_event, Outcome, StoreOp};
use crate::persistence::{MessageKind, MessageRecord, Persistence};
use crate::processor::Processor;
use crate::state::{ChannelState, NetworkState};
use crate::transport::{LineSender, TransportError};
use crate::utils::OrLog;

use kestrel_bus::{Event, EventBus};

use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use strum::Display;
use tokio::sync::mpsc::Receiver;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum SessionLifecycle {
    Disconnected,
    Connecting,
    Connected,
}

/// Runtime binding of a [`NetworkIdentity`] to one open transport.
///
/// Created by the [`Orchestrator`](crate::Orchestrator) once an endpoint
/// accepts the connection. The session is `Connected` from then until the read
/// loop observes the transport closing.
pub struct Session {
    identity: NetworkIdentity,
    endpoint: Endpoint,
    sender: LineSender,
    state: RwLock<NetworkState>,
    connected: AtomicBool,
    torn_down: AtomicBool,
    bus: Arc<EventBus>,
    store: Arc<dyn Persistence>,
}

impl Session {
    pub(crate) fn new(
        identity: NetworkIdentity,
        endpoint: Endpoint,
        sender: LineSender,
        state: NetworkState,
        bus: Arc<EventBus>,
        store: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            identity,
            endpoint,
            sender,
            state: RwLock::new(state),
            connected: AtomicBool::new(true),
            torn_down: AtomicBool::new(false),
            bus,
            store,
        }
    }

    pub fn identity(&self) -> &NetworkIdentity {
        &self.identity
    }

    pub fn network_id(&self) -> NetworkId {
        self.identity.id
    }

    /// The endpoint this session is bound to
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn lifecycle(&self) -> SessionLifecycle {
        if self.is_connected() {
            SessionLifecycle::Connected
        } else {
            SessionLifecycle::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Whether [`disconnect`](crate::Orchestrator::disconnect) has been called
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Our current nickname on the network
    pub fn nickname(&self) -> String {
        self.state.read().nickname.clone()
    }

    pub fn is_registered(&self) -> bool {
        self.state.read().registered
    }

    pub fn account(&self) -> Option<String> {
        self.state.read().account.clone()
    }

    /// A snapshot of one channel
    pub fn channel(&self, name: &str) -> Option<ChannelState> {
        self.state.read().channel(name).cloned()
    }

    /// Snapshots of every known channel, sorted by name
    pub fn channels(&self) -> Vec<ChannelState> {
        let mut channels: Vec<_> = self.state.read().channels().cloned().collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        channels
    }

    /// Run `f` against the current network state
    pub fn with_state<T>(&self, f: impl FnOnce(&NetworkState) -> T) -> T {
        f(&self.state.read())
    }

    pub fn send_raw(&self, line: &str) -> Result<(), TransportError> {
        self.sender.send_raw(line)
    }

    pub fn join(&self, channel: &str, key: Option<&str>) -> Result<(), TransportError> {
        self.sender.join(channel, key)
    }

    pub fn part(&self, channel: &str, reason: Option<&str>) -> Result<(), TransportError> {
        self.sender.part(channel, reason)
    }

    /// Send a message to a channel or user. The message is stored before it
    /// is sent, so that it is already in history when the server echoes it.
    pub fn send_message(&self, target: &str, text: &str) -> Result<(), TransportError> {
        check_line(text)?;
        self.record_outbound(MessageKind::Message, target, text);
        self.sender.privmsg(target, text)?;
        self.publish_sent(target, text, MessageKind::Message);
        Ok(())
    }

    /// Send a `/me` action
    pub fn send_action(&self, target: &str, text: &str) -> Result<(), TransportError> {
        check_line(text)?;
        self.record_outbound(MessageKind::Action, target, text);
        self.sender.ctcp(target, "ACTION", text)?;
        self.publish_sent(target, text, MessageKind::Action);
        Ok(())
    }

    pub fn send_notice(&self, target: &str, text: &str) -> Result<(), TransportError> {
        check_line(text)?;
        self.record_outbound(MessageKind::Notice, target, text);
        self.sender.notice(target, text)?;
        self.publish_sent(target, text, MessageKind::Notice);
        Ok(())
    }

    /// Send a CTCP query such as `VERSION` or `PING`
    pub fn send_ctcp(&self, target: &str, command: &str, params: &str) -> Result<(), TransportError> {
        self.sender.ctcp(target, &command.to_ascii_uppercase(), params)
    }

    pub fn whois(&self, nickname: &str) -> Result<(), TransportError> {
        self.sender.whois(nickname)
    }

    pub fn set_topic(&self, channel: &str, topic: &str) -> Result<(), TransportError> {
        self.sender.topic(channel, topic)
    }

    pub fn change_nick(&self, nickname: &str) -> Result<(), TransportError> {
        self.sender.nick(nickname)
    }

    pub fn quit(&self, reason: Option<&str>) -> Result<(), TransportError> {
        self.sender.quit(reason)
    }

    /// Mark a channel to be joined automatically on every future connection
    pub fn set_auto_join(&self, channel: &str, auto_join: bool) {
        let (name, created) = {
            let mut state = self.state.write();
            let (record, created) = state.ensure_channel(channel);
            record.auto_join = auto_join;
            (record.name.clone(), created)
        };

        if created {
            StoreOp::UpsertChannel(name.clone()).apply(self.network_id(), self.store.as_ref());
        }
        self.store
            .set_channel_auto_join(self.network_id(), &name, auto_join)
            .or_log(format_args!("storing auto-join flag of {}", name));
    }

    fn record_outbound(&self, kind: MessageKind, target: &str, text: &str) {
        let record = MessageRecord::new(self.network_id(), kind, text)
            .in_channel(target)
            .from_user(self.nickname());

        self.store
            .write_message_sync(record)
            .or_log(format_args!("storing message to {}", target));
    }

    fn publish_sent(&self, target: &str, text: &str, kind: MessageKind) {
        let event = self.event("message.sent")
            .with("target", target)
            .with("message", text)
            .with("kind", kind.to_string());
        self.bus.publish(event);
    }

    fn event(&self, event_type: &str) -> Event {
        network_event(&self.state.read(), event_type)
    }

    /// Send the registration burst. Capability negotiation, if enabled, has
    /// to open before anything else.
    pub(crate) fn register(&self, negotiator: &mut Negotiator) {
        let mut out = Outcome::new();
        negotiator.start(&mut out);

        if let Some(password) = &self.identity.password {
            out.send(format!("PASS {}", password));
        }
        out.send(format!("NICK {}", self.identity.nickname));
        out.send(format!("USER {} 0 * :{}", self.identity.username, self.identity.realname));

        self.apply(out);
    }

    /// Read and handle lines until the connection closes
    pub(crate) async fn run(&self, mut lines: Receiver<String>, mut negotiator: Negotiator, processor: Arc<Processor>) {
        while let Some(line) = lines.recv().await {
            let Some(msg) = InboundMessage::parse(&line) else {
                tracing::debug!(network = %self.identity.name, %line, "unparseable line");
                continue;
            };

            let mut out = Outcome::new();
            let step = {
                let mut state = self.state.write();
                if !negotiator.handle(&mut state, &msg, &mut out) {
                    processor.process(&mut state, &msg, &mut out);
                }
                negotiator.take_step()
            };

            // Key derivation can be slow, so it runs unlocked and off the runtime
            if let Some(step) = step {
                match tokio::task::spawn_blocking(move || step.run()).await {
                    Ok(completed) => negotiator.complete_step(&self.state.read(), completed, &mut out),
                    Err(e) => {
                        tracing::error!(network = %self.identity.name, "SASL step failed to run: {}", e);
                        negotiator.abandon_step(&self.state.read(), e.to_string(), &mut out);
                    }
                }
            }
            self.apply(out);
        }

        self.connected.store(false, Ordering::Release);
        self.sender.close();

        tracing::info!(network = %self.identity.name, endpoint = %self.endpoint, "connection lost");
        self.store
            .write_message(MessageRecord::status(
                self.network_id(),
                format!("Disconnected from {}", self.endpoint),
            ))
            .or_log("writing status record");
        self.bus.publish(self.event("connection.lost"));
    }

    /// Carry out the effects of one handled line, in order: replies to the
    /// server, storage writes, then events
    fn apply(&self, out: Outcome) {
        for line in &out.lines {
            self.sender
                .send_raw(line)
                .or_log(format_args!("sending to {}", self.identity.name));
        }

        for op in out.store {
            op.apply(self.network_id(), self.store.as_ref());
        }

        for event in out.events {
            self.bus.publish(event);
        }

        if out.registered {
            self.auto_join();
        }
    }

    /// Join every channel marked for auto-join. Channels which are merely
    /// open are left alone.
    fn auto_join(&self) {
        let channels = self.state.read().auto_join_channels();

        for channel in channels {
            tracing::debug!(network = %self.identity.name, %channel, "auto-joining");
            self.sender
                .join(&channel, None)
                .or_log(format_args!("auto-joining {}", channel));
        }
    }

    /// Called by the orchestrator on disconnect
    pub(crate) fn tear_down(&self, reason: Option<&str>) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sender.quit(reason).or_log("sending QUIT");
        self.sender.close();
    }
}

/// Refuse text that would be split into several lines on the wire, before
/// anything is stored for it
fn check_line(text: &str) -> Result<(), TransportError> {
    if text.contains(['\r', '\n']) {
        Err(TransportError::InvalidLine)
    } else {
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("network", &self.identity.name)
            .field("endpoint", &self.endpoint)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}
