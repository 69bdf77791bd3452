//! Per-session view of the network: channels and their members, the server's
//! advertised parameters, and in-flight WHOIS replies.

use crate::id::NetworkId;
use crate::persistence::ChannelRecord;
use crate::utils::{irc_eq, irc_lower};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A user's presence in a channel
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Member {
    pub nick: String,
    /// Prefix mode letters held, highest rank first (e.g. `"ov"`)
    pub modes: String,
}

impl Member {
    pub fn new(nick: impl Into<String>, modes: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            modes: modes.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChannelState {
    pub name: String,
    pub topic: Option<String>,
    pub modes: String,
    pub auto_join: bool,
    /// Whether the local user is currently in the channel
    pub open: bool,
    members: HashMap<String, Member>,
    names_refresh: bool,
}

impl ChannelState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: None,
            modes: String::new(),
            auto_join: false,
            open: false,
            members: HashMap::new(),
            names_refresh: false,
        }
    }

    /// Rebuild from stored state. The stored open flag is not carried over, as
    /// a new session starts outside every channel.
    pub fn from_record(record: &ChannelRecord) -> Self {
        let mut ret = Self::new(&record.name);
        ret.topic = record.topic.clone();
        ret.modes = record.modes.clone();
        ret.auto_join = record.auto_join;
        ret
    }

    pub fn member(&self, nick: &str) -> Option<&Member> {
        self.members.get(&irc_lower(nick))
    }

    pub fn has_member(&self, nick: &str) -> bool {
        self.members.contains_key(&irc_lower(nick))
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Members sorted by nickname, for stable comparison and storage
    pub fn sorted_members(&self) -> Vec<Member> {
        let mut members: Vec<_> = self.members.values().cloned().collect();
        members.sort();
        members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Insert or replace a member entry
    pub fn upsert_member(&mut self, member: Member) {
        self.members.insert(irc_lower(&member.nick), member);
    }

    /// Ensure `nick` is present, keeping any prefix modes it already holds
    pub fn add_member(&mut self, nick: &str) -> &Member {
        self.members
            .entry(irc_lower(nick))
            .and_modify(|m| m.nick = nick.to_string())
            .or_insert_with(|| Member::new(nick, ""))
    }

    pub fn remove_member(&mut self, nick: &str) -> Option<Member> {
        self.members.remove(&irc_lower(nick))
    }

    /// Move a member entry to a new nickname, keeping its modes.
    ///
    /// Returns false if `old_nick` was not present.
    pub fn rename_member(&mut self, old_nick: &str, new_nick: &str) -> bool {
        match self.members.remove(&irc_lower(old_nick)) {
            Some(mut member) => {
                member.nick = new_nick.to_string();
                self.members.insert(irc_lower(new_nick), member);
                true
            }
            None => false,
        }
    }

    pub fn clear_members(&mut self) {
        self.members.clear();
    }

    pub(crate) fn member_mut(&mut self, nick: &str) -> Option<&mut Member> {
        self.members.get_mut(&irc_lower(nick))
    }

    /// Called for each member-list fragment. The first fragment of a cycle
    /// clears the member set; later ones leave it alone.
    ///
    /// Returns true if this call started a new cycle.
    pub fn begin_names_refresh(&mut self) -> bool {
        if self.names_refresh {
            false
        } else {
            self.names_refresh = true;
            self.members.clear();
            true
        }
    }

    pub fn end_names_refresh(&mut self) {
        self.names_refresh = false;
    }

    pub fn names_refresh_in_progress(&self) -> bool {
        self.names_refresh
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IsupportError {
    #[error("Malformed PREFIX value {0:?}")]
    MalformedPrefix(String),
}

/// Parameters advertised by the server in RPL_ISUPPORT
#[derive(Clone, Debug)]
pub struct ServerSupport {
    /// Prefix character to the mode letter it represents
    pub prefix_map: HashMap<char, char>,
    /// Prefix characters, highest rank first
    pub prefix_string: String,
    /// Prefix mode letters, in the same order as `prefix_string`
    pub prefix_modes: String,
    /// Raw CHANMODES value
    pub chan_modes: String,
    pub chan_types: String,
    pub network_name: Option<String>,
}

impl Default for ServerSupport {
    fn default() -> Self {
        let mut ret = Self {
            prefix_map: HashMap::new(),
            prefix_string: String::new(),
            prefix_modes: String::new(),
            chan_modes: String::new(),
            chan_types: "#&".to_string(),
            network_name: None,
        };
        // RFC 1459 servers that never send ISUPPORT still use these
        let _ = ret.apply_prefix("(ov)@+");
        ret
    }
}

/// Used to classify channel modes when the server hasn't sent CHANMODES
const DEFAULT_CHANMODES: &str = "beI,k,l,imnpst";

impl ServerSupport {
    /// Apply a `PREFIX=(modes)chars` value. Mode letters and prefix characters
    /// pair up positionally. On error the existing mapping is left untouched.
    pub fn apply_prefix(&mut self, value: &str) -> Result<(), IsupportError> {
        let malformed = || IsupportError::MalformedPrefix(value.to_string());

        // An empty value means the server has no prefixes at all
        if value.is_empty() {
            self.prefix_map.clear();
            self.prefix_string.clear();
            self.prefix_modes.clear();
            return Ok(());
        }

        let rest = value.strip_prefix('(').ok_or_else(malformed)?;
        let (modes, chars) = rest.split_once(')').ok_or_else(malformed)?;

        if modes.chars().count() != chars.chars().count() {
            return Err(malformed());
        }

        self.prefix_map = chars.chars().zip(modes.chars()).collect();
        self.prefix_string = chars.to_string();
        self.prefix_modes = modes.to_string();
        Ok(())
    }

    pub fn mode_for_prefix(&self, prefix: char) -> Option<char> {
        self.prefix_map.get(&prefix).copied()
    }

    pub fn prefix_for_mode(&self, mode: char) -> Option<char> {
        self.prefix_map
            .iter()
            .find(|(_, m)| **m == mode)
            .map(|(p, _)| *p)
    }

    pub fn is_prefix_mode(&self, mode: char) -> bool {
        self.prefix_modes.contains(mode)
    }

    pub fn is_channel(&self, name: &str) -> bool {
        name.chars()
            .next()
            .map_or(false, |c| self.chan_types.contains(c))
    }

    /// Split a NAMES token into its prefix mode letters and nickname, dropping
    /// any `!user@host` suffix.
    pub fn split_names_token<'a>(&self, token: &'a str) -> (String, &'a str) {
        let nick_start = token
            .char_indices()
            .find(|(_, c)| !self.prefix_map.contains_key(c))
            .map_or(token.len(), |(i, _)| i);

        let modes = token[..nick_start]
            .chars()
            .filter_map(|c| self.mode_for_prefix(c))
            .collect::<String>();

        let nick = &token[nick_start..];
        let nick = nick.split_once('!').map_or(nick, |(n, _)| n);

        (self.sort_prefix_modes(&modes), nick)
    }

    /// Order prefix mode letters by rank, dropping duplicates
    pub fn sort_prefix_modes(&self, modes: &str) -> String {
        self.prefix_modes.chars().filter(|m| modes.contains(*m)).collect()
    }

    /// Whether a channel mode letter consumes an argument when set (`adding`)
    /// or unset.
    pub fn mode_takes_param(&self, mode: char, adding: bool) -> bool {
        if self.is_prefix_mode(mode) {
            return true;
        }

        let chan_modes = if self.chan_modes.is_empty() {
            DEFAULT_CHANMODES
        } else {
            self.chan_modes.as_str()
        };

        let mut groups = chan_modes.split(',');
        let list = groups.next().unwrap_or("");
        let always = groups.next().unwrap_or("");
        let on_set = groups.next().unwrap_or("");

        list.contains(mode) || always.contains(mode) || (adding && on_set.contains(mode))
    }

    /// Whether a mode letter is a list mode (bans, exceptions and the like)
    pub fn is_list_mode(&self, mode: char) -> bool {
        let chan_modes = if self.chan_modes.is_empty() {
            DEFAULT_CHANMODES
        } else {
            self.chan_modes.as_str()
        };
        chan_modes.split(',').next().map_or(false, |list| list.contains(mode))
    }
}

/// Details about a user gathered from a sequence of WHOIS replies
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoisRecord {
    pub nick: String,
    pub username: Option<String>,
    pub host: Option<String>,
    pub realname: Option<String>,
    pub server: Option<String>,
    pub server_info: Option<String>,
    pub operator: bool,
    pub idle_secs: Option<u64>,
    pub signon: Option<i64>,
    pub channels: Vec<String>,
    pub account: Option<String>,
    pub secure: bool,
    pub away: Option<String>,
}

impl WhoisRecord {
    pub fn new(nick: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            ..Default::default()
        }
    }
}

/// Everything the engine knows about one network for the lifetime of a session
#[derive(Clone, Debug)]
pub struct NetworkState {
    pub network_id: NetworkId,
    /// Label used as the `network` field of published events
    pub network: String,
    /// The local user's current nickname
    pub nickname: String,
    /// Whether the server has accepted our registration
    pub registered: bool,
    /// Account name, once logged in
    pub account: Option<String>,
    pub support: ServerSupport,
    channels: HashMap<String, ChannelState>,
    whois: HashMap<String, WhoisRecord>,
}

impl NetworkState {
    pub fn new(network_id: NetworkId, network: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            network_id,
            network: network.into(),
            nickname: nickname.into(),
            registered: false,
            account: None,
            support: ServerSupport::default(),
            channels: HashMap::new(),
            whois: HashMap::new(),
        }
    }

    /// Load stored channel records, so that auto-join flags and last-known
    /// topics are available before the server tells us anything
    pub fn seed_channels(&mut self, records: &[ChannelRecord]) {
        for record in records {
            self.channels
                .insert(irc_lower(&record.name), ChannelState::from_record(record));
        }
    }

    pub fn is_me(&self, nick: &str) -> bool {
        irc_eq(&self.nickname, nick)
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelState> {
        self.channels.get(&irc_lower(name))
    }

    pub fn channel_mut(&mut self, name: &str) -> Option<&mut ChannelState> {
        self.channels.get_mut(&irc_lower(name))
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChannelState> {
        self.channels.values()
    }

    pub(crate) fn channels_mut(&mut self) -> impl Iterator<Item = &mut ChannelState> {
        self.channels.values_mut()
    }

    /// Look up a channel, creating an empty record if there isn't one.
    ///
    /// The flag is true if the record was created by this call.
    pub fn ensure_channel(&mut self, name: &str) -> (&mut ChannelState, bool) {
        let key = irc_lower(name);
        let created = !self.channels.contains_key(&key);
        let channel = self
            .channels
            .entry(key)
            .or_insert_with(|| ChannelState::new(name));
        (channel, created)
    }

    /// Names of channels marked for auto-join
    pub fn auto_join_channels(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .channels
            .values()
            .filter(|c| c.auto_join)
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names
    }

    /// The WHOIS accumulator for `nick`, opening one if needed
    pub fn whois_entry(&mut self, nick: &str) -> &mut WhoisRecord {
        self.whois
            .entry(irc_lower(nick))
            .or_insert_with(|| WhoisRecord::new(nick))
    }

    pub fn has_whois(&self, nick: &str) -> bool {
        self.whois.contains_key(&irc_lower(nick))
    }

    /// Close and return the accumulator for `nick`
    pub fn take_whois(&mut self, nick: &str) -> Option<WhoisRecord> {
        self.whois.remove(&irc_lower(nick))
    }
}
