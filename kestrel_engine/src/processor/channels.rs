use super::*;

pub(super) fn handle_join(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let (Some(nick), Some(channel_name)) = (msg.source_nick(), msg.arg(0)) else {
        return;
    };
    let is_me = net.is_me(nick);

    let (channel, created) = net.ensure_channel(channel_name);
    let mut changed = created;
    if is_me && !channel.open {
        channel.open = true;
        changed = true;
    }
    // Membership isn't cleared here; the NAMES reply rebuilds it
    let member = channel.add_member(nick).clone();
    let name = channel.name.clone();

    if created || is_me {
        out.store(StoreOp::UpsertChannel(name.clone()));
    }
    if is_me {
        out.store(StoreOp::ChannelOpen(name.clone(), true));
        out.send(format!("NAMES {}", name));
    }
    out.store(StoreOp::UpsertMember(name.clone(), member));
    out.record(
        record(net, MessageKind::Join, format!("{} has joined {}", nick, name))
            .in_channel(&name)
            .from_user(nick),
    );

    out.emit(
        network_event(net, "user.joined")
            .with("channel", name)
            .with("user", nick),
    );
    if changed {
        out.emit(network_event(net, "channels.changed"));
    }
}

/// Shared by PART and KICK: take `nick` out of the channel, closing it if
/// that was us. Returns the channel's name and whether our own view of the
/// channel changed, or `None` if the channel is unknown.
fn leave_channel(net: &mut NetworkState, channel_name: &str, nick: &str, out: &mut Outcome) -> Option<(String, bool)> {
    let is_me = net.is_me(nick);
    let Some(channel) = net.channel_mut(channel_name) else {
        tracing::debug!(channel = %channel_name, %nick, "departure from unknown channel");
        return None;
    };

    channel.remove_member(nick);
    let name = channel.name.clone();

    if !is_me {
        out.store(StoreOp::RemoveMember(name.clone(), nick.to_string()));
        return Some((name, false));
    }

    let changed = channel.open;
    channel.open = false;
    channel.clear_members();
    channel.end_names_refresh();

    out.store(StoreOp::ChannelOpen(name.clone(), false));
    out.store(StoreOp::ReplaceMembers(name.clone(), Vec::new()));
    Some((name, changed))
}

pub(super) fn handle_part(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let (Some(nick), Some(channel_name)) = (msg.source_nick(), msg.arg(0)) else {
        return;
    };
    let reason = msg.arg(1);

    let Some((name, changed)) = leave_channel(net, channel_name, nick, out) else {
        return;
    };

    let text = match reason {
        Some(reason) => format!("{} has left {} ({})", nick, name, reason),
        None => format!("{} has left {}", nick, name),
    };
    out.record(
        record(net, MessageKind::Part, text)
            .in_channel(&name)
            .from_user(nick),
    );

    out.emit(
        network_event(net, "user.parted")
            .with("channel", name)
            .with("user", nick)
            .with_opt("reason", reason),
    );
    if changed {
        out.emit(network_event(net, "channels.changed"));
    }
}

/// `:kicker KICK <channel> <victim> [:reason]`
pub(super) fn handle_kick(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let (Some(channel_name), Some(victim)) = (msg.arg(0), msg.arg(1)) else {
        return;
    };
    let kicker = msg.source_nick().unwrap_or_default();
    let reason = msg.arg(2);

    let Some((name, changed)) = leave_channel(net, channel_name, victim, out) else {
        return;
    };

    let text = match reason {
        Some(reason) => format!("{} was kicked from {} by {} ({})", victim, name, kicker, reason),
        None => format!("{} was kicked from {} by {}", victim, name, kicker),
    };
    out.record(
        record(net, MessageKind::Kick, text)
            .in_channel(&name)
            .from_user(kicker),
    );

    out.emit(
        network_event(net, "user.kicked")
            .with("channel", name)
            .with("user", victim)
            .with("by", kicker)
            .with_opt("reason", reason),
    );
    if changed {
        out.emit(network_event(net, "channels.changed"));
    }
}

pub(super) fn handle_quit(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let Some(nick) = msg.source_nick() else {
        return;
    };
    let reason = msg.arg(0);

    let mut left = Vec::new();
    let mut changed = false;
    if net.is_me(nick) {
        // Our own QUIT closes every channel, as a PART from each would
        let open: Vec<String> = net.channels().filter(|c| c.open).map(|c| c.name.clone()).collect();
        for name in open {
            if let Some((name, closed)) = leave_channel(net, &name, nick, out) {
                changed |= closed;
                left.push(name);
            }
        }
    } else {
        for channel in net.channels_mut() {
            if channel.remove_member(nick).is_some() {
                left.push(channel.name.clone());
            }
        }
        for name in &left {
            out.store(StoreOp::RemoveMember(name.clone(), nick.to_string()));
        }
    }
    left.sort();

    let text = match reason {
        Some(reason) => format!("{} has quit ({})", nick, reason),
        None => format!("{} has quit", nick),
    };
    for name in &left {
        out.record(
            record(net, MessageKind::Quit, text.as_str())
                .in_channel(name)
                .from_user(nick),
        );
    }

    out.emit(
        network_event(net, "user.quit")
            .with("user", nick)
            .with_opt("reason", reason)
            .with("channels", left),
    );
    if changed {
        out.emit(network_event(net, "channels.changed"));
    }
}

pub(super) fn handle_nick(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let (Some(old_nick), Some(new_nick)) = (msg.source_nick(), msg.arg(0)) else {
        return;
    };

    if net.is_me(old_nick) {
        tracing::info!(network = %net.network, old = %old_nick, new = %new_nick, "nickname changed");
        net.nickname = new_nick.to_string();
    }

    let mut renamed = Vec::new();
    for channel in net.channels_mut() {
        if channel.rename_member(old_nick, new_nick) {
            renamed.push(channel.name.clone());
        }
    }
    renamed.sort();

    out.store(StoreOp::RenameUser(old_nick.to_string(), new_nick.to_string()));
    let text = format!("{} is now known as {}", old_nick, new_nick);
    for name in &renamed {
        out.record(
            record(net, MessageKind::Nick, text.as_str())
                .in_channel(name)
                .from_user(new_nick),
        );
    }

    out.emit(
        network_event(net, "user.nick")
            .with("user", old_nick)
            .with("newNick", new_nick)
            .with("channels", renamed),
    );
}

/// Common path for TOPIC, RPL_TOPIC and RPL_NOTOPIC. `setter` is only known
/// for an actual change.
fn update_topic(net: &mut NetworkState, channel_name: &str, topic: &str, setter: Option<&str>, out: &mut Outcome) {
    let (channel, created) = net.ensure_channel(channel_name);
    channel.topic = if topic.is_empty() {
        None
    } else {
        Some(topic.to_string())
    };
    let name = channel.name.clone();

    if created {
        out.store(StoreOp::UpsertChannel(name.clone()));
    }
    out.store(StoreOp::Topic(name.clone(), topic.to_string()));

    if let Some(setter) = setter {
        out.record(
            record(net, MessageKind::Topic, format!("{} changed the topic to: {}", setter, topic))
                .in_channel(&name)
                .from_user(setter),
        );
    }

    out.emit(
        network_event(net, "channel.topic")
            .with("channel", name)
            .with("topic", topic)
            .with_opt("user", setter),
    );
}

pub(super) fn handle_topic(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let Some(channel_name) = msg.arg(0) else {
        return;
    };
    let topic = msg.arg(1).unwrap_or_default();
    update_topic(net, channel_name, topic, Some(msg.source_nick().unwrap_or_default()), out);
}

/// RPL_TOPIC: `<me> <channel> :<topic>`
pub(super) fn handle_topic_reply(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let (Some(channel_name), Some(topic)) = (msg.arg(1), msg.arg(2)) else {
        return;
    };
    update_topic(net, channel_name, topic, None, out);
}

/// RPL_NOTOPIC: `<me> <channel> :No topic is set`
pub(super) fn handle_no_topic(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let Some(channel_name) = msg.arg(1) else {
        return;
    };
    update_topic(net, channel_name, "", None, out);
}

/// `MODE <target> <modestring> [params...]`
pub(super) fn handle_mode(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let (Some(target), Some(modes)) = (msg.arg(0), msg.arg(1)) else {
        return;
    };

    if !net.support.is_channel(target) {
        tracing::debug!(network = %net.network, %target, %modes, "user mode change");
        return;
    }

    let setter = msg.source_nick().unwrap_or_default();
    let params = &msg.args[2..];
    let support = net.support.clone();

    let (channel, created) = net.ensure_channel(target);
    let name = channel.name.clone();
    if created {
        out.store(StoreOp::UpsertChannel(name.clone()));
    }

    let mut params = params.iter();
    let mut adding = true;
    let mut flags_changed = false;

    for mode in modes.chars() {
        match mode {
            '+' => adding = true,
            '-' => adding = false,
            _ => {
                let param = if support.mode_takes_param(mode, adding) {
                    params.next().map(String::as_str)
                } else {
                    None
                };

                if support.is_prefix_mode(mode) {
                    let Some(nick) = param else { continue };
                    if let Some(member) = channel.member_mut(nick) {
                        if adding {
                            let combined = format!("{}{}", member.modes, mode);
                            member.modes = support.sort_prefix_modes(&combined);
                        } else {
                            member.modes = member.modes.replace(mode, "");
                        }
                        out.store(StoreOp::UpsertMember(name.clone(), member.clone()));
                    }
                } else if !support.is_list_mode(mode) {
                    flags_changed |= set_flag(&mut channel.modes, mode, adding);
                }
            }
        }
    }

    if flags_changed {
        out.store(StoreOp::Modes(name.clone(), channel.modes.clone()));
    }

    let change = msg.args[1..].join(" ");
    out.record(
        record(net, MessageKind::Mode, format!("{} sets mode {}", setter, change))
            .in_channel(&name)
            .from_user(setter),
    );
    out.emit(
        network_event(net, "channel.mode")
            .with("channel", name)
            .with("modes", change)
            .with("user", setter),
    );
}

/// Add or remove a mode letter in a `+letters` string. Returns whether the
/// string changed.
fn set_flag(modes: &mut String, mode: char, adding: bool) -> bool {
    let mut letters: Vec<char> = modes.chars().filter(|c| *c != '+').collect();
    let present = letters.contains(&mode);

    match (adding, present) {
        (true, false) => letters.push(mode),
        (false, true) => letters.retain(|c| *c != mode),
        _ => return false,
    }

    letters.sort_unstable();
    *modes = if letters.is_empty() {
        String::new()
    } else {
        format!("+{}", letters.into_iter().collect::<String>())
    };
    true
}

/// RPL_CHANNELMODEIS: `<me> <channel> <modestring> [params...]`
pub(super) fn handle_channel_mode_is(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let (Some(channel_name), Some(modes)) = (msg.arg(1), msg.arg(2)) else {
        return;
    };

    let (channel, created) = net.ensure_channel(channel_name);
    let name = channel.name.clone();

    // Parameters (keys, limits) are not kept
    channel.modes.clear();
    for mode in modes.chars().filter(|c| *c != '+') {
        set_flag(&mut channel.modes, mode, true);
    }
    let stored = channel.modes.clone();

    if created {
        out.store(StoreOp::UpsertChannel(name.clone()));
    }
    out.store(StoreOp::Modes(name.clone(), stored.clone()));
    out.emit(
        network_event(net, "channel.mode")
            .with("channel", name)
            .with("modes", stored),
    );
}
