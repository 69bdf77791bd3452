use super::*;

pub(super) fn handle_welcome(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    // The first argument is the nickname the server actually registered
    if let Some(nick) = msg.arg(0) {
        if net.nickname != nick {
            tracing::info!(network = %net.network, old = %net.nickname, new = %nick, "registered under a different nickname");
            net.nickname = nick.to_string();
        }
    }

    if !net.registered {
        net.registered = true;
        out.registered = true;
        tracing::info!(network = %net.network, nick = %net.nickname, "registered");
    }
}

/// 432/433. Before registration completes, retry with an underscore
/// appended; afterwards the server is refusing a change the user asked for.
pub(super) fn handle_nick_rejected(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let rejected = msg.arg(1).unwrap_or(&net.nickname).to_string();

    if !net.registered {
        let next = format!("{}_", rejected);
        tracing::info!(network = %net.network, %rejected, %next, "nickname unavailable, retrying");
        out.send(format!("NICK {}", next));
        net.nickname = next;
        return;
    }

    let text = format!("{}: {}", rejected, msg.last_arg().unwrap_or_default());
    out.record(record(net, MessageKind::Error, text.as_str()));
    out.emit(
        network_event(net, "error")
            .with("error", text)
            .with("code", msg.command.as_str()),
    );
}

pub(super) fn handle_ping(_: &HandlerContext, _net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    match msg.last_arg() {
        Some(token) => out.send(format!("PONG :{}", token)),
        None => out.send("PONG"),
    }
}

/// The server is about to close the link
pub(super) fn handle_error(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let reason = msg.last_arg().unwrap_or_default();
    tracing::warn!(network = %net.network, %reason, "server sent ERROR");
    out.record(MessageRecord::status(net.network_id, format!("Server error: {}", reason)));
}
