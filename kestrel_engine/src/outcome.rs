//! What handling one inbound line decided should happen.
//!
//! Protocol handlers only mutate [`NetworkState`]; everything with an effect
//! outside it (events, replies to the server, storage writes) is collected in
//! an [`Outcome`] and carried out by the session afterwards, in order.

use crate::id::NetworkId;
use crate::persistence::{MessageRecord, Persistence};
use crate::state::{Member, NetworkState};
use crate::utils::OrLog;

use kestrel_bus::Event;

/// `source` field of events published by the engine
pub const EVENT_SOURCE: &str = "engine";

/// Start an event of the given type carrying the network's label and id
pub fn network_event(net: &NetworkState, event_type: &str) -> Event {
    Event::new(event_type, EVENT_SOURCE)
        .with("network", net.network.as_str())
        .with("networkId", net.network_id.as_i64())
}

/// A pending write to persistent storage
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOp {
    Message(MessageRecord),
    UpsertChannel(String),
    ChannelOpen(String, bool),
    Topic(String, String),
    Modes(String, String),
    ReplaceMembers(String, Vec<Member>),
    UpsertMember(String, Member),
    RemoveMember(String, String),
    RenameUser(String, String),
}

impl StoreOp {
    /// Carry out the write. Failures are logged and otherwise ignored.
    pub fn apply(self, network: NetworkId, store: &dyn Persistence) {
        match self {
            Self::Message(record) => store.write_message(record).or_log("writing message"),
            Self::UpsertChannel(channel) => store
                .upsert_channel(network, &channel)
                .or_log(format_args!("storing channel {}", channel)),
            Self::ChannelOpen(channel, open) => store
                .set_channel_open(network, &channel, open)
                .or_log(format_args!("updating open flag of {}", channel)),
            Self::Topic(channel, topic) => store
                .set_topic(network, &channel, &topic)
                .or_log(format_args!("storing topic of {}", channel)),
            Self::Modes(channel, modes) => store
                .set_channel_modes(network, &channel, &modes)
                .or_log(format_args!("storing modes of {}", channel)),
            Self::ReplaceMembers(channel, members) => store
                .replace_members(network, &channel, &members)
                .or_log(format_args!("storing member list of {}", channel)),
            Self::UpsertMember(channel, member) => store
                .upsert_member(network, &channel, &member)
                .or_log(format_args!("storing member {} of {}", member.nick, channel)),
            Self::RemoveMember(channel, nick) => store
                .remove_member(network, &channel, &nick)
                .or_log(format_args!("removing member {} of {}", nick, channel)),
            Self::RenameUser(old_nick, new_nick) => store
                .rename_user(network, &old_nick, &new_nick)
                .or_log(format_args!("renaming {} to {}", old_nick, new_nick)),
        }
    }
}

#[derive(Debug, Default)]
pub struct Outcome {
    /// Events to publish, in order
    pub events: Vec<Event>,
    /// Lines to send to the server, in order
    pub lines: Vec<String>,
    pub store: Vec<StoreOp>,
    /// Set when this line completed registration
    pub registered: bool,
}

impl Outcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn send(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn store(&mut self, op: StoreOp) {
        self.store.push(op);
    }

    pub fn record(&mut self, record: MessageRecord) {
        self.store.push(StoreOp::Message(record));
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.lines.is_empty() && self.store.is_empty() && !self.registered
    }

    /// Events of the given type, for inspection
    pub fn events_of(&self, event_type: &str) -> impl Iterator<Item = &Event> + '_ {
        let event_type = event_type.to_string();
        self.events.iter().filter(move |e| e.event_type == event_type)
    }
}
