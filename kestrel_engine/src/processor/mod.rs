//! Turns inbound protocol lines into state changes.
//!
//! Each command or numeric maps to one handler in a dispatch table. Handlers
//! mutate the [`NetworkState`] they are given and describe every other effect
//! in the [`Outcome`], so they can be exercised without a connection.

use crate::config::EngineSettings;
use crate::message::InboundMessage;
use crate::numeric::{self, *};
use crate::outcome::{network_event, Outcome, StoreOp};
use crate::persistence::{MessageKind, MessageRecord};
use crate::state::{Member, NetworkState};

use std::collections::HashMap;

mod channels;
mod errors;
mod isupport;
mod messages;
mod names;
mod registration;
mod whois;

/// Settings that handlers need but that aren't part of the network state
#[derive(Clone, Debug)]
pub struct HandlerContext {
    /// Reply to CTCP VERSION
    pub ctcp_version: String,
}

impl From<&EngineSettings> for HandlerContext {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            ctcp_version: settings.ctcp_version.clone(),
        }
    }
}

pub type Handler = fn(&HandlerContext, &mut NetworkState, &InboundMessage, &mut Outcome);

pub struct Processor {
    context: HandlerContext,
    handlers: HashMap<&'static str, Handler>,
}

impl Processor {
    pub fn new(context: HandlerContext) -> Self {
        let mut handlers = HashMap::<&'static str, Handler>::new();

        handlers.insert(RPL_WELCOME, registration::handle_welcome);
        handlers.insert(ERR_NICKNAMEINUSE, registration::handle_nick_rejected);
        handlers.insert(ERR_ERRONEUSNICKNAME, registration::handle_nick_rejected);
        handlers.insert("PING", registration::handle_ping);
        handlers.insert("ERROR", registration::handle_error);

        handlers.insert(RPL_ISUPPORT, isupport::handle_isupport);

        handlers.insert(RPL_NAMREPLY, names::handle_names_reply);
        handlers.insert(RPL_ENDOFNAMES, names::handle_end_of_names);

        handlers.insert("JOIN", channels::handle_join);
        handlers.insert("PART", channels::handle_part);
        handlers.insert("KICK", channels::handle_kick);
        handlers.insert("QUIT", channels::handle_quit);
        handlers.insert("NICK", channels::handle_nick);
        handlers.insert("TOPIC", channels::handle_topic);
        handlers.insert(RPL_TOPIC, channels::handle_topic_reply);
        handlers.insert(RPL_NOTOPIC, channels::handle_no_topic);
        handlers.insert("MODE", channels::handle_mode);
        handlers.insert(RPL_CHANNELMODEIS, channels::handle_channel_mode_is);

        handlers.insert(RPL_WHOISUSER, whois::handle_whois_user);
        handlers.insert(RPL_WHOISSERVER, whois::handle_whois_server);
        handlers.insert(RPL_WHOISOPERATOR, whois::handle_whois_operator);
        handlers.insert(RPL_WHOISIDLE, whois::handle_whois_idle);
        handlers.insert(RPL_WHOISCHANNELS, whois::handle_whois_channels);
        handlers.insert(RPL_WHOISACCOUNT, whois::handle_whois_account);
        handlers.insert(RPL_WHOISSECURE, whois::handle_whois_secure);
        handlers.insert(RPL_AWAY, whois::handle_away);
        handlers.insert(RPL_ENDOFWHOIS, whois::handle_end_of_whois);

        handlers.insert("PRIVMSG", messages::handle_privmsg);
        handlers.insert("NOTICE", messages::handle_notice);

        for code in ERROR_NUMERICS {
            handlers.insert(*code, errors::handle_error_numeric);
        }

        Self { context, handlers }
    }

    pub fn handles(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    /// Apply one inbound line to `net`, adding its effects to `out`
    pub fn process(&self, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
        match self.handlers.get(msg.command.as_str()) {
            Some(handler) => handler(&self.context, net, msg, out),
            None => {
                tracing::trace!(
                    network = %net.network,
                    command = %msg.command,
                    name = numeric::name_of(&msg.command).unwrap_or_default(),
                    "unhandled"
                );
            }
        }
    }
}

/// Whether a message's source is a server rather than a user
fn from_server(msg: &InboundMessage) -> bool {
    match &msg.source {
        None => true,
        Some(source) => source.user.is_none() && source.host.is_none() && source.nick.contains('.'),
    }
}

/// Shorthand for building a history line
fn record(net: &NetworkState, kind: MessageKind, text: impl Into<String>) -> MessageRecord {
    MessageRecord::new(net.network_id, kind, text)
}

#[cfg(test)]
mod tests;
