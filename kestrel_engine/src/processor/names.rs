use super::*;

/// RPL_NAMREPLY: `<me> [symbol] <channel> :[prefix]nick[!user@host] ...`
pub(super) fn handle_names_reply(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    if msg.args.len() < 3 {
        return;
    }
    let channel_name = &msg.args[msg.args.len() - 2];
    let names = &msg.args[msg.args.len() - 1];

    let members: Vec<Member> = names
        .split_ascii_whitespace()
        .map(|token| net.support.split_names_token(token))
        .filter(|(_, nick)| !nick.is_empty())
        .map(|(modes, nick)| Member::new(nick, modes))
        .collect();

    let (channel, created) = net.ensure_channel(channel_name);
    if created {
        out.store(StoreOp::UpsertChannel(channel.name.clone()));
    }

    if channel.begin_names_refresh() {
        tracing::trace!(channel = %channel.name, "member list refresh started");
    }
    for member in members {
        channel.upsert_member(member);
    }
}

/// RPL_ENDOFNAMES: `<me> <channel> :End of /NAMES list`
pub(super) fn handle_end_of_names(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let Some(channel_name) = msg.arg(1) else {
        return;
    };
    let Some(channel) = net.channel_mut(channel_name) else {
        tracing::debug!(network = %net.network, channel = %channel_name, "end of names for unknown channel");
        return;
    };

    channel.end_names_refresh();
    let name = channel.name.clone();
    let members = channel.sorted_members();
    let count = members.len();

    out.store(StoreOp::ReplaceMembers(name.clone(), members));
    out.emit(
        network_event(net, "channel.names.complete")
            .with("channel", name)
            .with("count", count),
    );
}
