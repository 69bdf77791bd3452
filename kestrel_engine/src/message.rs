//! Tokenising of lines received from the server

use std::fmt;

/// A message tag attached to an inbound (server->client) message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageTag {
    pub name: String,
    pub value: Option<String>,
}

/// The origin of a message, as given in its `:source` prefix
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageSource {
    /// Nickname, or server name for server-originated messages
    pub nick: String,
    pub user: Option<String>,
    pub host: Option<String>,
}

impl MessageSource {
    pub fn parse(raw: &str) -> Self {
        let (nick_user, host) = match raw.split_once('@') {
            Some((nu, h)) => (nu, Some(h.to_string())),
            None => (raw, None),
        };
        let (nick, user) = match nick_user.split_once('!') {
            Some((n, u)) => (n, Some(u.to_string())),
            None => (nick_user, None),
        };

        Self {
            nick: nick.to_string(),
            user,
            host,
        }
    }
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.nick)?;
        if let Some(user) = &self.user {
            write!(f, "!{}", user)?;
        }
        if let Some(host) = &self.host {
            write!(f, "@{}", host)?;
        }
        Ok(())
    }
}

/// A tokenised, but not yet processed, line from the server
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub tags: Vec<MessageTag>,
    pub source: Option<MessageSource>,
    /// The command or numeric, upper-cased
    pub command: String,
    pub args: Vec<String>,
}

impl InboundMessage {
    /// Create an `InboundMessage` from a received line
    pub fn parse(raw: &str) -> Option<Self> {
        let mut args = Vec::new();
        let mut tags = Vec::new();
        let mut source = None;

        let mut raw = raw.trim_end_matches(['\r', '\n']).trim_start();
        if raw.is_empty() {
            return None;
        }

        if let Some(tag_str) = raw.strip_prefix('@') {
            // A string of tags with nothing after it isn't a message
            let space_offset = tag_str.find(' ')?;

            for tag_def in tag_str[..space_offset].split(';') {
                let (name, value) = match tag_def.split_once('=') {
                    Some((n, v)) => (n.to_string(), Some(v.to_string())),
                    None => (tag_def.to_string(), None),
                };

                tags.push(MessageTag { name, value });
            }

            raw = tag_str[space_offset..].trim_start();
        }

        if let Some(source_str) = raw.strip_prefix(':') {
            let space_offset = source_str.find(' ')?;
            source = Some(MessageSource::parse(&source_str[..space_offset]));
            raw = source_str[space_offset..].trim_start();
        }

        let (command, mut rest) = match raw.split_once(' ') {
            Some((command, rest)) => (command, rest),
            None => (raw, ""),
        };

        if command.is_empty() {
            return None;
        }

        loop {
            if let Some(arg) = rest.strip_prefix(':') {
                args.push(arg.to_string());
                break;
            }

            match rest.find(' ') {
                Some(offset) => {
                    let arg = &rest[0..offset];

                    if !arg.is_empty() {
                        args.push(arg.to_string());
                    }

                    rest = &rest[offset + 1..];
                }
                None => {
                    if !rest.is_empty() {
                        args.push(rest.to_string());
                    }
                    break;
                }
            }
        }

        Some(Self {
            tags,
            source,
            command: command.to_ascii_uppercase(),
            args,
        })
    }

    /// Nickname of the sender, if the message has a source
    pub fn source_nick(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.nick.as_str())
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// The trailing argument, which for most commands carries free text
    pub fn last_arg(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }

    pub fn tag(&self, name: &str) -> Option<&MessageTag> {
        self.tags.iter().find(|t| t.name == name)
    }
}
