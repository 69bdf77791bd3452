use super::*;

/// Error numerics: `<me> [<subject>...] :<text>`. The subject is a channel,
/// nickname or command depending on the numeric; some (441, 443) name a
/// nickname and then a channel. Surfaced as an `error` event and a history
/// line, in the channel's buffer when any subject is a channel.
pub(super) fn handle_error_numeric(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
    let code = msg.command.as_str();
    let fallback = numeric::error_description(code).unwrap_or("Unknown error");

    let subjects = match msg.args.len() {
        0..=2 => &[][..],
        n => &msg.args[1..n - 1],
    };
    let text = match msg.last_arg() {
        Some(text) if msg.args.len() > 1 && !text.is_empty() => text,
        _ => fallback,
    };

    let channel = subjects
        .iter()
        .find(|s| net.support.is_channel(s))
        .map(|s| net.channel(s).map_or_else(|| s.clone(), |c| c.name.clone()));

    let error = match subjects.first() {
        Some(subject) if !net.support.is_channel(subject) => format!("{}: {}", subject, text),
        _ => text.to_string(),
    };

    tracing::debug!(network = %net.network, %code, %error, "error reply");

    let mut line = record(net, MessageKind::Error, error.as_str());
    if let Some(channel) = &channel {
        line = line.in_channel(channel);
    }
    out.record(line);

    out.emit(
        network_event(net, "error")
            .with_opt("channel", channel)
            .with("error", error)
            .with("code", code),
    );
}
