//! WHOIS replies all take the form `<me> <nick> ...`. Each one fills in part of
//! the accumulator for `<nick>`, opening it if needed; RPL_ENDOFWHOIS
//! publishes the result.

use super::*;
use crate::state::WhoisRecord;

fn entry<'a>(net: &'a mut NetworkState, msg: &InboundMessage) -> Option<&'a mut WhoisRecord> {
    msg.arg(1).map(|nick| net.whois_entry(nick))
}

/// `<me> <nick> <user> <host> * :<realname>`
pub(super) fn handle_whois_user(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, _: &mut Outcome) {
    if let Some(whois) = entry(net, msg) {
        whois.username = msg.arg(2).map(str::to_string);
        whois.host = msg.arg(3).map(str::to_string);
        whois.realname = msg.arg(5).map(str::to_string);
    }
}

/// `<me> <nick> <server> :<server info>`
pub(super) fn handle_whois_server(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, _: &mut Outcome) {
    if let Some(whois) = entry(net, msg) {
        whois.server = msg.arg(2).map(str::to_string);
        whois.server_info = msg.arg(3).map(str::to_string);
    }
}

pub(super) fn handle_whois_operator(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, _: &mut Outcome) {
    if let Some(whois) = entry(net, msg) {
        whois.operator = true;
    }
}

/// `<me> <nick> <idle secs> <signon> :seconds idle, signon time`
pub(super) fn handle_whois_idle(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, _: &mut Outcome) {
    if let Some(whois) = entry(net, msg) {
        whois.idle_secs = msg.arg(2).and_then(|s| s.parse().ok());
        whois.signon = msg.arg(3).and_then(|s| s.parse().ok());
    }
}

/// `<me> <nick> :{[prefix]<channel> }`. May be sent more than once.
pub(super) fn handle_whois_channels(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, _: &mut Outcome) {
    let channels = msg.arg(2).unwrap_or_default();
    if let Some(whois) = entry(net, msg) {
        whois
            .channels
            .extend(channels.split_ascii_whitespace().map(str::to_string));
    }
}

/// `<me> <nick> <account> :is logged in as`
pub(super) fn handle_whois_account(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, _: &mut Outcome) {
    if let Some(whois) = entry(net, msg) {
        whois.account = msg.arg(2).map(str::to_string);
    }
}

pub(super) fn handle_whois_secure(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, _: &mut Outcome) {
    if let Some(whois) = entry(net, msg) {
        whois.secure = true;
    }
}

/// RPL_AWAY is also the reply to messaging an away user, so it only counts
/// towards a WHOIS that is already being collected
pub(super) fn handle_away(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, _: &mut Outcome) {
    let Some(nick) = msg.arg(1) else {
        return;
    };

    if net.has_whois(nick) {
        net.whois_entry(nick).away = msg.arg(2).map(str::to_string);
    } else {
        tracing::debug!(network = %net.network, %nick, message = ?msg.arg(2), "user is away");
    }
}

pub(super) fn handle_end_of_whois(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let Some(nick) = msg.arg(1) else {
        return;
    };
    // Nothing was collected, e.g. after ERR_NOSUCHNICK
    let Some(whois) = net.take_whois(nick) else {
        return;
    };

    match serde_json::to_value(&whois) {
        Ok(value) => out.emit(network_event(net, "whois.received").with("whois", value)),
        Err(e) => tracing::error!(network = %net.network, %nick, "couldn't serialise whois reply: {}", e),
    }
}
