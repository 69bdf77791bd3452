//! The contract between the engine and whatever stores messages and channel
//! state on its behalf.
//!
//! The engine treats every failure here as non-fatal: callers log the error
//! and carry on, and never retry.

use crate::id::NetworkId;
use crate::state::Member;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

mod memory;
pub use memory::*;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("No such channel {0}")]
    NoSuchChannel(String),
    #[error("Storage error: {0}")]
    Other(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageKind {
    Message,
    Action,
    Notice,
    Join,
    Part,
    Quit,
    Kick,
    Nick,
    Topic,
    Mode,
    Status,
    Error,
}

/// One line of history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub network: NetworkId,
    /// Buffer the line belongs to; `None` for the network's status buffer
    pub channel: Option<String>,
    pub user: Option<String>,
    pub text: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
}

impl MessageRecord {
    pub fn new(network: NetworkId, kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            network,
            channel: None,
            user: None,
            text: text.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// A status line for the network's status buffer
    pub fn status(network: NetworkId, text: impl Into<String>) -> Self {
        Self::new(network, MessageKind::Status, text)
    }

    pub fn in_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn from_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Stored state of a channel, as seen at the start of a session
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub name: String,
    pub topic: Option<String>,
    pub modes: String,
    pub auto_join: bool,
    pub open: bool,
}

impl ChannelRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Storage for messages and channel state, keyed by network.
///
/// Channel and nickname arguments compare case-insensitively.
pub trait Persistence: Send + Sync + 'static {
    /// Queue a history line. May return before the line is queryable.
    fn write_message(&self, record: MessageRecord) -> PersistenceResult<()>;

    /// Write a history line and return only once it is queryable
    fn write_message_sync(&self, record: MessageRecord) -> PersistenceResult<()>;

    fn channels(&self, network: NetworkId) -> PersistenceResult<Vec<ChannelRecord>>;

    /// Create the channel record if it does not exist
    fn upsert_channel(&self, network: NetworkId, channel: &str) -> PersistenceResult<()>;

    fn set_channel_open(&self, network: NetworkId, channel: &str, open: bool) -> PersistenceResult<()>;

    fn set_channel_auto_join(&self, network: NetworkId, channel: &str, auto_join: bool) -> PersistenceResult<()>;

    fn set_topic(&self, network: NetworkId, channel: &str, topic: &str) -> PersistenceResult<()>;

    fn set_channel_modes(&self, network: NetworkId, channel: &str, modes: &str) -> PersistenceResult<()>;

    /// Replace the whole member list of a channel
    fn replace_members(&self, network: NetworkId, channel: &str, members: &[Member]) -> PersistenceResult<()>;

    fn upsert_member(&self, network: NetworkId, channel: &str, member: &Member) -> PersistenceResult<()>;

    fn remove_member(&self, network: NetworkId, channel: &str, nick: &str) -> PersistenceResult<()>;

    /// Rename a user in every channel of the network
    fn rename_user(&self, network: NetworkId, old_nick: &str, new_nick: &str) -> PersistenceResult<()>;
}
