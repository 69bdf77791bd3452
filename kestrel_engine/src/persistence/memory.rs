use super::*;
use crate::utils::irc_lower;

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct StoredChannel {
    record: ChannelRecord,
    members: BTreeMap<String, Member>,
}

#[derive(Debug, Default)]
struct MemoryStore {
    messages: Vec<MessageRecord>,
    channels: HashMap<(NetworkId, String), StoredChannel>,
}

/// A [`Persistence`] implementation that keeps everything in memory.
///
/// Buffered and synchronous writes behave identically. Writes can be made to
/// fail on demand, to exercise the engine's handling of storage errors.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    store: Mutex<MemoryStore>,
    failing: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    fn check(&self) -> PersistenceResult<()> {
        if self.failing.load(Ordering::Relaxed) {
            Err(PersistenceError::Unavailable("writes disabled".to_string()))
        } else {
            Ok(())
        }
    }

    /// All history lines written so far, oldest first
    pub fn messages(&self) -> Vec<MessageRecord> {
        self.store.lock().messages.clone()
    }

    /// History lines of a given kind
    pub fn messages_of_kind(&self, kind: MessageKind) -> Vec<MessageRecord> {
        self.store
            .lock()
            .messages
            .iter()
            .filter(|m| m.kind == kind)
            .cloned()
            .collect()
    }

    pub fn channel(&self, network: NetworkId, channel: &str) -> Option<ChannelRecord> {
        self.store
            .lock()
            .channels
            .get(&(network, irc_lower(channel)))
            .map(|c| c.record.clone())
    }

    /// Stored members of a channel, sorted by folded nickname
    pub fn members(&self, network: NetworkId, channel: &str) -> Vec<Member> {
        self.store
            .lock()
            .channels
            .get(&(network, irc_lower(channel)))
            .map(|c| c.members.values().cloned().collect())
            .unwrap_or_default()
    }

    fn with_channel<T>(
        &self,
        network: NetworkId,
        channel: &str,
        f: impl FnOnce(&mut StoredChannel) -> T,
    ) -> PersistenceResult<T> {
        self.check()?;
        let mut store = self.store.lock();
        let stored = store
            .channels
            .get_mut(&(network, irc_lower(channel)))
            .ok_or_else(|| PersistenceError::NoSuchChannel(channel.to_string()))?;
        Ok(f(stored))
    }
}

impl Persistence for MemoryPersistence {
    fn write_message(&self, record: MessageRecord) -> PersistenceResult<()> {
        self.write_message_sync(record)
    }

    fn write_message_sync(&self, record: MessageRecord) -> PersistenceResult<()> {
        self.check()?;
        self.store.lock().messages.push(record);
        Ok(())
    }

    fn channels(&self, network: NetworkId) -> PersistenceResult<Vec<ChannelRecord>> {
        self.check()?;
        let store = self.store.lock();
        let mut channels: Vec<_> = store
            .channels
            .iter()
            .filter(|((net, _), _)| *net == network)
            .map(|(_, c)| c.record.clone())
            .collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(channels)
    }

    fn upsert_channel(&self, network: NetworkId, channel: &str) -> PersistenceResult<()> {
        self.check()?;
        self.store
            .lock()
            .channels
            .entry((network, irc_lower(channel)))
            .or_insert_with(|| StoredChannel {
                record: ChannelRecord::new(channel),
                members: BTreeMap::new(),
            });
        Ok(())
    }

    fn set_channel_open(&self, network: NetworkId, channel: &str, open: bool) -> PersistenceResult<()> {
        self.with_channel(network, channel, |c| c.record.open = open)
    }

    fn set_channel_auto_join(&self, network: NetworkId, channel: &str, auto_join: bool) -> PersistenceResult<()> {
        self.with_channel(network, channel, |c| c.record.auto_join = auto_join)
    }

    fn set_topic(&self, network: NetworkId, channel: &str, topic: &str) -> PersistenceResult<()> {
        self.with_channel(network, channel, |c| c.record.topic = Some(topic.to_string()))
    }

    fn set_channel_modes(&self, network: NetworkId, channel: &str, modes: &str) -> PersistenceResult<()> {
        self.with_channel(network, channel, |c| c.record.modes = modes.to_string())
    }

    fn replace_members(&self, network: NetworkId, channel: &str, members: &[Member]) -> PersistenceResult<()> {
        self.with_channel(network, channel, |c| {
            c.members = members
                .iter()
                .map(|m| (irc_lower(&m.nick), m.clone()))
                .collect();
        })
    }

    fn upsert_member(&self, network: NetworkId, channel: &str, member: &Member) -> PersistenceResult<()> {
        self.with_channel(network, channel, |c| {
            c.members.insert(irc_lower(&member.nick), member.clone());
        })
    }

    fn remove_member(&self, network: NetworkId, channel: &str, nick: &str) -> PersistenceResult<()> {
        self.with_channel(network, channel, |c| {
            c.members.remove(&irc_lower(nick));
        })
    }

    fn rename_user(&self, network: NetworkId, old_nick: &str, new_nick: &str) -> PersistenceResult<()> {
        self.check()?;
        let mut store = self.store.lock();
        let old_key = irc_lower(old_nick);

        for ((net, _), stored) in store.channels.iter_mut() {
            if *net != network {
                continue;
            }
            if let Some(mut member) = stored.members.remove(&old_key) {
                member.nick = new_nick.to_string();
                stored.members.insert(irc_lower(new_nick), member);
            }
        }
        Ok(())
    }
}
