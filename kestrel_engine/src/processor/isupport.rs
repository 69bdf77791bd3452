use super::*;

/// RPL_ISUPPORT: `<me> TOKEN[=VALUE]... :are supported by this server`
pub(super) fn handle_isupport(_: &HandlerContext, net: &mut NetworkState, msg: &InboundMessage, _out: &mut Outcome) {
    if msg.args.len() < 3 {
        return;
    }

    for token in &msg.args[1..msg.args.len() - 1] {
        // Negated parameters revert to defaults we don't track
        if token.starts_with('-') {
            continue;
        }

        let (name, value) = token.split_once('=').unwrap_or((token.as_str(), ""));

        match name {
            "PREFIX" => {
                if let Err(e) = net.support.apply_prefix(value) {
                    tracing::warn!(network = %net.network, "ignoring ISUPPORT token: {}", e);
                }
            }
            "CHANMODES" => net.support.chan_modes = value.to_string(),
            "CHANTYPES" => net.support.chan_types = value.to_string(),
            "NETWORK" => net.support.network_name = Some(value.to_string()),
            _ => (),
        }
    }
}
