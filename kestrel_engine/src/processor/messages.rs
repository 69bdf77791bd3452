use super::*;
use crate::ctcp::{self, CtcpMessage};

use chrono::Utc;

/// The buffer a message belongs in: the channel, or for private messages the
/// other party
fn buffer_for<'a>(net: &NetworkState, sender: &'a str, target: &'a str) -> &'a str {
    if net.support.is_channel(target) || net.is_me(sender) {
        target
    } else {
        sender
    }
}

/// A message we sent to ourselves, reflected back by the server. It was
/// recorded when sent.
fn is_echo(net: &NetworkState, sender: &str, target: &str) -> bool {
    net.is_me(sender) && net.is_me(target)
}

fn store_message(net: &NetworkState, kind: MessageKind, sender: &str, target: &str, text: &str, out: &mut Outcome) {
    let buffer = buffer_for(net, sender, target);

    out.record(
        record(net, kind, text)
            .in_channel(buffer)
            .from_user(sender),
    );
    out.emit(
        network_event(net, "message.received")
            .with("channel", buffer)
            .with("user", sender)
            .with("message", text)
            .with("kind", kind.to_string()),
    );
}

pub(super) fn handle_privmsg(ctx: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let (Some(target), Some(text)) = (msg.arg(0), msg.arg(1)) else {
        return;
    };
    let sender = msg.source_nick().unwrap_or_default();
    let echo = is_echo(net, sender, target);

    if let Some(query) = CtcpMessage::parse(text) {
        if query.command == "ACTION" {
            if !echo {
                store_message(net, MessageKind::Action, sender, target, query.params, out);
            }
            return;
        }

        let reply = match query.command.as_str() {
            "VERSION" => Some(ctx.ctcp_version.clone()),
            "TIME" => Some(Utc::now().to_rfc2822()),
            "PING" => Some(query.params.to_string()),
            "CLIENTINFO" => Some(ctcp::SUPPORTED.join(" ")),
            _ => None,
        };

        match reply {
            Some(reply) if !sender.is_empty() => {
                tracing::debug!(network = %net.network, %sender, command = %query.command, "answering CTCP query");
                out.send(format!(
                    "NOTICE {} :{}",
                    sender,
                    ctcp::encode(&query.command, &reply)
                ));
            }
            _ => {
                tracing::debug!(network = %net.network, %sender, command = %query.command, "dropping CTCP query");
            }
        }
        return;
    }

    if echo {
        tracing::trace!(network = %net.network, "suppressing echoed message");
        return;
    }

    store_message(net, MessageKind::Message, sender, target, text, out);
}

pub(super) fn handle_notice(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let (Some(target), Some(text)) = (msg.arg(0), msg.arg(1)) else {
        return;
    };

    if from_server(msg) {
        let server = msg.source_nick().unwrap_or_default();
        out.record(record(net, MessageKind::Notice, text).from_user(server));
        out.emit(
            network_event(net, "message.received")
                .with("user", server)
                .with("message", text)
                .with("kind", MessageKind::Notice.to_string()),
        );
        return;
    }

    let sender = msg.source_nick().unwrap_or_default();
    if is_echo(net, sender, target) {
        return;
    }

    // CTCP replies are shown, never answered
    match CtcpMessage::parse(text) {
        Some(reply) => {
            let text = format!("{} {}", reply.command, reply.params);
            store_message(net, MessageKind::Notice, sender, target, text.trim_end(), out);
        }
        None => store_message(net, MessageKind::Notice, sender, target, text, out),
    }
}
